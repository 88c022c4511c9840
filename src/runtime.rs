//! Thread-local evaluation context (spec §4.5 cycle diagnostics) and the
//! ambient async resource-body story (spec §5).
//!
//! Grounded in the teacher's `RUNTIME` thread_local and `Runtime::current()`/
//! `enter()` guard pattern in `composer.rs`: ambient state carried alongside
//! a recursive, single-threaded evaluation pass rather than threaded through
//! every call explicitly.

use std::cell::RefCell;

thread_local! {
    static STACK: RefCell<Vec<String>> = RefCell::new(Vec::new());
}

/// Dropping this pops the frame it pushed — the same guard shape as the
/// teacher's `Runtime::enter()`.
pub(crate) struct Frame;

impl Drop for Frame {
    fn drop(&mut self) {
        STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Record that `name` is currently being forced, for cycle-error messages.
pub(crate) fn push_frame(name: &str) -> Frame {
    STACK.with(|stack| stack.borrow_mut().push(name.to_string()));
    Frame
}

/// Names currently in progress, outermost first.
pub(crate) fn current_stack() -> Vec<String> {
    STACK.with(|stack| stack.borrow().clone())
}

/// A cloneable handle to an already-spawned async computation (spec §5's
/// ambient async story): a resource body that needs asynchronous work
/// spawns it itself and returns this handle rather than a bare `Future`, so
/// every consumer observes the same in-flight or completed task instead of
/// re-running it, and no consumer can only `.await` it once.
#[cfg(feature = "rt")]
pub struct SharedTask<T> {
    state: std::rc::Rc<tokio::sync::Mutex<TaskState<T>>>,
}

#[cfg(feature = "rt")]
enum TaskState<T> {
    Pending(tokio::task::JoinHandle<T>),
    Ready(T),
    Failed,
}

#[cfg(feature = "rt")]
impl<T> Clone for SharedTask<T> {
    fn clone(&self) -> Self {
        SharedTask {
            state: self.state.clone(),
        }
    }
}

#[cfg(feature = "rt")]
impl<T: Clone + 'static> SharedTask<T> {
    /// Spawn `future` on the ambient tokio runtime and wrap its handle.
    pub fn spawn<F>(future: F) -> Self
    where
        F: std::future::Future<Output = T> + Send + 'static,
        T: Send,
    {
        SharedTask {
            state: std::rc::Rc::new(tokio::sync::Mutex::new(TaskState::Pending(tokio::task::spawn(future)))),
        }
    }

    /// Await the task's result, caching it so every later call — on this
    /// handle or a clone of it — returns the same value without rejoining
    /// the underlying task. Returns `None` if the task panicked or was
    /// cancelled.
    pub async fn get(&self) -> Option<T> {
        let mut guard = self.state.lock().await;
        match &*guard {
            TaskState::Ready(value) => return Some(value.clone()),
            TaskState::Failed => return None,
            TaskState::Pending(_) => {}
        }

        let handle = match std::mem::replace(&mut *guard, TaskState::Failed) {
            TaskState::Pending(handle) => handle,
            _ => unreachable!("checked above"),
        };

        *guard = match handle.await {
            Ok(value) => TaskState::Ready(value),
            Err(_) => TaskState::Failed,
        };

        match &*guard {
            TaskState::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }
}
