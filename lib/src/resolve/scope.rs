use std::sync::Arc;

use crate::template::Bindings;
use crate::value::{Globals, Value};

type Frame = Vec<(Arc<str>, Value)>;

/// Variable bindings visible at one point of a resolution: a stack of frames
/// over the globals. Lookups search the innermost frame first.
#[derive(Debug)]
pub struct Scope<'g> {
    globals: &'g Globals,
    frames: Vec<Frame>,
}

impl<'g> Scope<'g> {
    pub fn new(globals: &'g Globals) -> Self {
        Scope { globals, frames: vec![] }
    }

    pub fn push(&mut self) {
        self.frames.push(Frame::new());
    }

    /// Pushes a frame holding `bindings`, each bound to a scalar.
    pub fn push_bindings(&mut self, bindings: &Bindings) {
        let frame = bindings.iter()
            .map(|(k, v)| (k.clone(), Value::Scalar(v.clone())))
            .collect();

        self.frames.push(frame);
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// Binds `name` in the innermost frame, replacing any binding of `name`
    /// already in that frame.
    pub fn bind(&mut self, name: Arc<str>, value: Value) {
        if self.frames.is_empty() {
            self.push();
        }

        if let Some(frame) = self.frames.last_mut() {
            match frame.iter_mut().find(|(k, _)| *k == name) {
                Some((_, slot)) => *slot = value,
                None => frame.push((name, value)),
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev()
            .find_map(|frame| frame.iter().find(|(k, _)| &**k == name).map(|(_, v)| v))
            .or_else(|| self.globals.get(name))
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}
