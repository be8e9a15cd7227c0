//! Scripted pointer interaction
//!
//! A script is a TOML file with a list of steps replayed against a session:
//!
//! ```toml
//! [[steps]]
//! action = "pin"
//! x = 64.0
//! y = 64.0
//!
//! [[steps]]
//! action = "drag"
//! from = [96.0, 96.0]
//! to = [120.0, 90.0]
//! frames = 12
//!
//! [[steps]]
//! action = "settle"
//! frames = 20
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One scripted pointer action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Step {
    /// Place a control without moving it
    Pin { x: f64, y: f64 },
    /// Grab at `from` and drag to `to`, advancing one frame per increment
    Drag {
        from: [f64; 2],
        to: [f64; 2],
        #[serde(default = "default_drag_frames")]
        frames: u32,
    },
    /// Remove the control whose handle is hit at (x, y)
    Unpin { x: f64, y: f64 },
    /// Advance frames with no pointer input
    Settle { frames: u32 },
}

fn default_drag_frames() -> u32 {
    10
}

/// Ordered list of steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Script {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script file: {:?}", path))?;
        let script: Script = toml::from_str(&content)
            .with_context(|| format!("Failed to parse script file: {:?}", path))?;
        tracing::info!("Loaded script with {} steps from {:?}", script.steps.len(), path);
        Ok(script)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
