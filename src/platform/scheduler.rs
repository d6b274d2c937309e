//! Frame scheduling
//!
//! In the browser a frame request is a `requestAnimationFrame` id. Natively
//! (tests, headless runs) `ManualScheduler` just records what was asked for
//! and the caller pumps ticks itself.

/// Handle for a requested frame callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequest(pub i32);

pub trait FrameScheduler {
    /// Ask for the next frame callback
    fn request_frame(&mut self) -> FrameRequest;
    /// Cancel a request that has not fired yet
    fn cancel_frame(&mut self, request: FrameRequest);
}

/// Scheduler driven by hand. Clones share state so a test can keep one.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    state: std::rc::Rc<std::cell::RefCell<ManualState>>,
}

#[derive(Debug, Default)]
struct ManualState {
    next_id: i32,
    pending: Option<FrameRequest>,
    requested: u64,
    cancelled: u64,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request waiting to fire, if any
    pub fn pending(&self) -> Option<FrameRequest> {
        self.state.borrow().pending
    }

    /// Consume the pending request as if the frame fired
    pub fn fire(&self) -> Option<FrameRequest> {
        self.state.borrow_mut().pending.take()
    }

    pub fn requested(&self) -> u64 {
        self.state.borrow().requested
    }

    pub fn cancelled(&self) -> u64 {
        self.state.borrow().cancelled
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&mut self) -> FrameRequest {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let request = FrameRequest(state.next_id);
        state.pending = Some(request);
        state.requested += 1;
        request
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        let mut state = self.state.borrow_mut();
        if state.pending == Some(request) {
            state.pending = None;
            state.cancelled += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_fire_cancel() {
        let handle = ManualScheduler::new();
        let mut scheduler = handle.clone();
        let first = scheduler.request_frame();
        assert_eq!(handle.pending(), Some(first));
        assert_eq!(handle.fire(), Some(first));
        assert!(handle.pending().is_none());

        let second = scheduler.request_frame();
        assert_ne!(first, second);
        scheduler.cancel_frame(first);
        assert_eq!(handle.cancelled(), 0);
        scheduler.cancel_frame(second);
        assert_eq!(handle.cancelled(), 1);
        assert_eq!(handle.requested(), 2);
    }
}
