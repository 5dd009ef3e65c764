//! RAII defer-emit guard.
//!
//! The original views wrapped multi-row removals in a
//! `RemoveRowsScopeGuard` whose constructor called `beginRemoveRows()` and
//! whose destructor called `endRemoveRows()`, so every early return still
//! closed out the signal pair. There is no Qt model here to notify, but
//! the same shape is useful for any two-phase "announce, then do the
//! thing, then announce again" operation — run the closing half on drop so
//! a `?` in between can never skip it.

pub struct EmitGuard<F: FnOnce()> {
    on_end: Option<F>,
}

impl<F: FnOnce()> EmitGuard<F> {
    pub fn new(on_begin: impl FnOnce(), on_end: F) -> Self {
        on_begin();
        Self { on_end: Some(on_end) }
    }

    /// Suppresses the closing callback, for callers that decide partway
    /// through that nothing actually changed.
    pub fn cancel(mut self) {
        self.on_end = None;
    }
}

impl<F: FnOnce()> Drop for EmitGuard<F> {
    fn drop(&mut self) {
        if let Some(on_end) = self.on_end.take() {
            on_end();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn begin_runs_immediately_end_runs_on_drop() {
        let log = RefCell::new(Vec::new());
        {
            let _guard = EmitGuard::new(|| log.borrow_mut().push("begin"), || log.borrow_mut().push("end"));
            log.borrow_mut().push("body");
        }
        assert_eq!(*log.borrow(), vec!["begin", "body", "end"]);
    }

    #[test]
    fn end_runs_even_on_early_return() {
        let log = RefCell::new(Vec::new());
        fn run(log: &RefCell<Vec<&'static str>>) -> Option<()> {
            let _guard = EmitGuard::new(|| log.borrow_mut().push("begin"), || log.borrow_mut().push("end"));
            None?;
            Some(())
        }
        run(&log);
        assert_eq!(*log.borrow(), vec!["begin", "end"]);
    }

    #[test]
    fn cancel_suppresses_end_callback() {
        let log = RefCell::new(Vec::new());
        let guard = EmitGuard::new(|| log.borrow_mut().push("begin"), || log.borrow_mut().push("end"));
        guard.cancel();
        assert_eq!(*log.borrow(), vec!["begin"]);
    }
}
