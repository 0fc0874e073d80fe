use std::time::Instant;

use glam::Vec3;
use ratatui::{prelude::*, widgets::*};
use warehouse_mirror_core::{StateMirror, raster::Grid, scene::SceneGraph};

use crate::app::{App, format_clock};

/// What occupies one floor cell in the top-down view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glyph {
    Shelf { boxes: usize, full: bool },
    Box,
    Agent { heading: char, carrying: bool },
}

/// Arrow for a heading in degrees; rows grow with +z, so 0° points down.
pub fn heading_arrow(degrees: f32) -> char {
    match degrees.rem_euclid(360.0) {
        d if !(45.0..315.0).contains(&d) => 'v',
        d if d < 135.0 => '>',
        d if d < 225.0 => '^',
        _ => '<',
    }
}

/// Floor cells per axis the top-down view will allocate.
pub const MAX_FLOOR_CELLS: usize = 256;

/// Rasterizes the mirror onto a floor grid covering every entity, at most
/// [`MAX_FLOOR_CELLS`] per axis. Agents draw over boxes, boxes over shelves.
pub fn project(mirror: &StateMirror<SceneGraph>, capacity: usize) -> Grid<Option<Glyph>> {
    let points: Vec<Vec3> = mirror
        .agents()
        .map(|(_, a)| a.position)
        .chain(mirror.boxes().map(|(_, b)| b.position))
        .chain(mirror.shelves().iter().map(|s| s.position))
        .collect();
    if points.is_empty() {
        return Grid::new(0, 0);
    }

    // f64 keeps the span finite for any pair of finite f32 coordinates.
    let xs = points.iter().map(|p| f64::from(p.x).round());
    let zs = points.iter().map(|p| f64::from(p.z).round());
    let min_x = xs.clone().fold(f64::INFINITY, f64::min);
    let max_x = xs.fold(f64::NEG_INFINITY, f64::max);
    let min_z = zs.clone().fold(f64::INFINITY, f64::min);
    let max_z = zs.fold(f64::NEG_INFINITY, f64::max);
    let extent = |span: f64| (span.min((MAX_FLOOR_CELLS - 1) as f64) as usize) + 1;

    let mut grid = Grid::new(extent(max_x - min_x), extent(max_z - min_z));
    // Anchored at the minimum corner; cells past the clamp are dropped.
    let mut plot = |p: Vec3, glyph: Glyph| {
        let x = (f64::from(p.x).round() - min_x) as usize;
        let y = (f64::from(p.z).round() - min_z) as usize;
        if let Some(cell) = grid.get_mut(x, y) {
            *cell = Some(glyph);
        }
    };
    for shelf in mirror.shelves() {
        plot(
            shelf.position,
            Glyph::Shelf {
                boxes: shelf.box_count(),
                full: shelf.is_full(capacity),
            },
        );
    }
    for (_, item) in mirror.boxes() {
        plot(item.position, Glyph::Box);
    }
    for (_, agent) in mirror.agents() {
        plot(
            agent.position,
            Glyph::Agent {
                heading: heading_arrow(agent.heading_degrees()),
                carrying: agent.carrying,
            },
        );
    }
    grid
}

/// Renders the user interface.
pub fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(65), // Area for the floor
            Constraint::Percentage(25), // Area for agents and messages
            Constraint::Percentage(10), // Area for status/help
        ])
        .split(frame.area());
    let lower = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(main_layout[1]);

    render_floor(frame, main_layout[0], app);
    render_agents(frame, lower[0], app);
    render_messages(frame, lower[1], app);
    render_status(frame, main_layout[2], app);
}

fn render_floor(frame: &mut Frame, area: Rect, app: &App) {
    let grid = project(&app.mirror, app.shelf_capacity());
    let lines: Vec<Line> = grid
        .rows()
        .map(|row| {
            let spans: Vec<Span> = row
                .iter()
                .map(|cell| match cell {
                    None => Span::raw("."),
                    Some(Glyph::Shelf { boxes, full }) => {
                        let color = if *full { Color::Green } else { Color::Cyan };
                        let label = char::from_digit(*boxes as u32 % 10, 10).unwrap_or('#');
                        Span::styled(label.to_string(), Style::default().fg(color).bold())
                    }
                    Some(Glyph::Box) => Span::styled("b", Style::default().fg(Color::Yellow)),
                    Some(Glyph::Agent { heading, carrying }) => {
                        let color = if *carrying { Color::Magenta } else { Color::Red };
                        Span::styled(heading.to_string(), Style::default().fg(color).bold())
                    }
                })
                .collect();
            Line::from(spans)
        })
        .collect();

    let floor = Paragraph::new(lines)
        .block(Block::default().title("Warehouse").borders(Borders::ALL))
        .alignment(Alignment::Center);
    frame.render_widget(floor, area);
}

fn render_agents(frame: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .mirror
        .agents()
        .map(|(id, agent)| {
            let mut spans = vec![Span::raw(format!(
                "Agent {} Pos: ({:.1}, {:.1}) Heading: {:>4.0}°",
                id,
                agent.position.x,
                agent.position.z,
                agent.heading_degrees()
            ))];
            if agent.carrying {
                spans.push(Span::styled(
                    " carrying",
                    Style::default().fg(Color::Magenta),
                ));
            }
            ListItem::from(Line::from(spans))
        })
        .collect();

    let agents = List::new(items).block(Block::default().borders(Borders::ALL).title("Agents"));
    frame.render_widget(agents, area);
}

fn render_messages(frame: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .messages
        .iter()
        .map(|m| ListItem::new(m.text.clone()))
        .collect();
    let messages =
        List::new(items).block(Block::default().borders(Borders::ALL).title("Detections"));
    frame.render_widget(messages, area);
}

fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let mirror = &app.mirror;
    let full = mirror
        .shelves()
        .iter()
        .filter(|s| s.is_full(app.shelf_capacity()))
        .count();
    let mut status = vec![Span::raw(format!(
        "Step {} | Boxes {} | Carrying {} | Shelves full {}/{} | Time {}",
        mirror.step(),
        mirror.box_count(),
        mirror.carrying_count(),
        full,
        mirror.shelves().len(),
        format_clock(app.clock.elapsed(Instant::now()))
    ))];
    if app.finished {
        status.push(Span::styled(" | Run finished", Style::default().fg(Color::Green)));
    }
    if let Some(error) = &app.last_error {
        status.push(Span::styled(
            format!(" | {}", error),
            Style::default().fg(Color::Red),
        ));
    }

    let text = vec![
        Line::from(status),
        Line::from("Press 'q' or 'Esc' to quit."),
    ];
    let help = Paragraph::new(text)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help, area);
}
