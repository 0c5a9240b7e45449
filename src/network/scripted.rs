//! Frame subscriber fed from a script, for tests.

use std::collections::VecDeque;

use super::{BindError, FrameSubscriber, PipeFrame};

/// Delivers queued frames one per `receive` while bound.
#[derive(Debug, Default)]
pub(crate) struct ScriptedSubscriber {
    pub frames: VecDeque<PipeFrame>,
    pub bound: Option<String>,
    pub binds: Vec<String>,
    pub unbinds: u32,
    pub receives: u32,
}

impl ScriptedSubscriber {
    pub fn push(&mut self, frame: PipeFrame) {
        self.frames.push_back(frame);
    }
}

impl FrameSubscriber for ScriptedSubscriber {
    fn bind(&mut self, channel: &str) -> Result<(), BindError> {
        self.unbind();
        if channel.is_empty() {
            return Err(BindError::EmptyName);
        }
        self.binds.push(channel.to_string());
        self.bound = Some(channel.to_string());
        Ok(())
    }

    fn unbind(&mut self) {
        if self.bound.take().is_some() {
            self.unbinds += 1;
        }
    }

    fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    fn receive(&mut self) -> Option<PipeFrame> {
        self.receives += 1;
        if self.bound.is_none() {
            return None;
        }
        self.frames.pop_front()
    }
}
