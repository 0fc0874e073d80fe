use serde::Deserialize;

/// Tuning knobs for [`StateMirror`](crate::StateMirror).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MirrorConfig {
    /// Exponential smoothing rate for agent turns, per second.
    #[serde(default = "default_turn_rate")]
    pub turn_rate: f32,
    /// Height at which loose boxes rest.
    #[serde(default = "default_box_height")]
    pub box_height: f32,
    /// Vertical spacing between boxes stacked on a shelf.
    #[serde(default = "default_stack_step")]
    pub stack_step: f32,
    /// Elapsed time assumed for the first reconcile, which has no previous
    /// reconcile to measure from.
    #[serde(default = "default_elapsed_ms")]
    pub default_elapsed_ms: u64,
}

fn default_turn_rate() -> f32 {
    10.0
}

fn default_box_height() -> f32 {
    0.5
}

fn default_stack_step() -> f32 {
    0.5
}

fn default_elapsed_ms() -> u64 {
    100
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            turn_rate: default_turn_rate(),
            box_height: default_box_height(),
            stack_step: default_stack_step(),
            default_elapsed_ms: default_elapsed_ms(),
        }
    }
}
