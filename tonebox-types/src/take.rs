use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::TakeId;

/// A finalized, playable recording on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeResource {
    pub path: PathBuf,
    pub frames: usize,
    pub sample_rate: u32,
    pub channels: u16,
}

impl TakeResource {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f32 / self.sample_rate as f32
    }
}

/// One finished recording in the take list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Take {
    pub id: TakeId,
    pub resource: TakeResource,
    pub is_looping: bool,
}

impl Take {
    pub fn new(id: TakeId, resource: TakeResource) -> Self {
        Self {
            id,
            resource,
            is_looping: false,
        }
    }
}
