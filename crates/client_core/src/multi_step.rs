use std::{collections::BTreeSet, sync::Arc};

use shared::domain::Fields;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct MultiStepState {
    pub current_step: usize,
    pub form_data: Fields,
    pub completed_steps: BTreeSet<usize>,
}

pub struct MultiStepFormController<S> {
    steps: Arc<Vec<S>>,
    initial: Fields,
    state: Arc<watch::Sender<MultiStepState>>,
}

impl<S> Clone for MultiStepFormController<S> {
    fn clone(&self) -> Self {
        Self {
            steps: Arc::clone(&self.steps),
            initial: self.initial.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<S> MultiStepFormController<S> {
    pub fn new(steps: Vec<S>, initial: Fields) -> Self {
        let (state, _) = watch::channel(MultiStepState {
            current_step: 0,
            form_data: initial.clone(),
            completed_steps: BTreeSet::new(),
        });
        Self {
            steps: Arc::new(steps),
            initial,
            state: Arc::new(state),
        }
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn current_step(&self) -> usize {
        self.state.borrow().current_step
    }

    pub fn current(&self) -> Option<&S> {
        self.steps.get(self.current_step())
    }

    pub fn is_first_step(&self) -> bool {
        self.current_step() == 0
    }

    pub fn is_last_step(&self) -> bool {
        self.current_step() + 1 == self.steps.len()
    }

    pub fn next_step(&self) -> bool {
        let last = self.steps.len().saturating_sub(1);
        self.state.send_if_modified(|state| {
            if self.steps.is_empty() || state.current_step >= last {
                return false;
            }
            state.completed_steps.insert(state.current_step);
            state.current_step += 1;
            debug!(step = state.current_step, "advanced to step");
            true
        })
    }

    pub fn prev_step(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.current_step == 0 {
                return false;
            }
            state.current_step -= 1;
            true
        })
    }

    pub fn go_to_step(&self, step: usize) -> bool {
        if step >= self.steps.len() {
            return false;
        }
        self.state.send_if_modified(|state| {
            let moved = state.current_step != step;
            state.current_step = step;
            moved
        })
    }

    pub fn update_form_data(&self, partial: Fields) {
        self.state.send_modify(|state| state.form_data.extend(partial));
    }

    pub fn reset(&self) {
        self.state.send_replace(MultiStepState {
            current_step: 0,
            form_data: self.initial.clone(),
            completed_steps: BTreeSet::new(),
        });
    }

    pub fn form_data(&self) -> Fields {
        self.state.borrow().form_data.clone()
    }

    pub fn completed_steps(&self) -> BTreeSet<usize> {
        self.state.borrow().completed_steps.clone()
    }

    pub fn progress(&self) -> f64 {
        if self.steps.is_empty() {
            return 0.0;
        }
        (self.current_step() + 1) as f64 / self.steps.len() as f64 * 100.0
    }

    pub fn snapshot(&self) -> MultiStepState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MultiStepState> {
        self.state.subscribe()
    }

    pub fn changes(&self) -> WatchStream<MultiStepState> {
        WatchStream::new(self.subscribe())
    }
}

#[cfg(test)]
#[path = "tests/multi_step_tests.rs"]
mod tests;
