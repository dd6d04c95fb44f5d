//! In-memory job client for tests. Records every call; events are injected
//! by the test directly into the runner or collection.

use super::{JobClient, JobHandle};
use crate::model::{Query, RunnerId};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create { runner: RunnerId, goal: String },
    Next(RunnerId),
    Stop(RunnerId),
    Abort(RunnerId),
    Respond(RunnerId, String),
    Destroy(RunnerId),
}

#[derive(Debug, Clone, Default)]
pub struct FakeJobClient {
    calls: Rc<RefCell<Vec<Call>>>,
}

impl FakeJobClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.borrow().iter().filter(|c| *c == call).count()
    }

    pub fn destroys(&self, runner: RunnerId) -> usize {
        self.count(&Call::Destroy(runner))
    }
}

impl JobClient for FakeJobClient {
    fn create(&self, runner: RunnerId, query: &Query) -> Box<dyn JobHandle> {
        self.calls.borrow_mut().push(Call::Create {
            runner,
            goal: query.goal.clone(),
        });
        Box::new(FakeHandle {
            runner,
            calls: self.calls.clone(),
        })
    }
}

struct FakeHandle {
    runner: RunnerId,
    calls: Rc<RefCell<Vec<Call>>>,
}

impl JobHandle for FakeHandle {
    fn next(&mut self) {
        self.calls.borrow_mut().push(Call::Next(self.runner));
    }

    fn stop(&mut self) {
        self.calls.borrow_mut().push(Call::Stop(self.runner));
    }

    fn abort(&mut self) {
        self.calls.borrow_mut().push(Call::Abort(self.runner));
    }

    fn respond(&mut self, text: &str) {
        self.calls
            .borrow_mut()
            .push(Call::Respond(self.runner, text.to_string()));
    }

    fn destroy(self: Box<Self>) {
        self.calls.borrow_mut().push(Call::Destroy(self.runner));
    }
}
