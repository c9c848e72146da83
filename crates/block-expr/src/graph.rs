//! Lazily evaluated, memoised tasks.
//!
//! A [`Delayed`] is one node of the computation description: a thunk plus
//! the tasks it depends on. Building a graph never runs anything. The first
//! [`Delayed::compute`] on a node walks its upstream with an explicit work
//! stack, so arbitrarily long chains of writes are evaluated without deep
//! recursion, and every node caches its result (success or error) for later
//! consumers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{BlockExprError, Result};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(0);

type Thunk<T> = Box<dyn FnOnce() -> Result<T> + Send>;

enum TaskState<T> {
    Pending {
        thunk: Thunk<T>,
        deps: Vec<Arc<dyn Node>>,
    },
    Running,
    Done(Result<T>),
}

struct Task<T> {
    id: u64,
    name: String,
    state: Mutex<TaskState<T>>,
}

/// Type-erased view of a task used by the evaluation walk.
trait Node: Send + Sync {
    fn is_done(&self) -> bool;

    /// Dependencies that still have to run before this task can.
    fn pending_deps(&self) -> Vec<Arc<dyn Node>>;

    /// Run the thunk; a no-op unless the task is pending.
    fn run(&self);

    /// Detach the dependencies of a pending task.
    fn take_deps(&self) -> Vec<Arc<dyn Node>>;
}

impl<T: Clone + Send + 'static> Node for Task<T> {
    fn is_done(&self) -> bool {
        matches!(*self.state.lock(), TaskState::Done(_))
    }

    fn pending_deps(&self) -> Vec<Arc<dyn Node>> {
        match &*self.state.lock() {
            TaskState::Pending { deps, .. } => {
                deps.iter().filter(|d| !d.is_done()).cloned().collect()
            }
            _ => Vec::new(),
        }
    }

    fn run(&self) {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, TaskState::Running) {
            TaskState::Pending { thunk, deps } => {
                tracing::trace!(task = self.id, name = %self.name, "running task");
                let result = thunk();
                *state = TaskState::Done(result);
                drop(deps);
            }
            other => *state = other,
        }
    }

    fn take_deps(&self) -> Vec<Arc<dyn Node>> {
        match &mut *self.state.lock() {
            TaskState::Pending { deps, .. } => std::mem::take(deps),
            _ => Vec::new(),
        }
    }
}

impl<T> Drop for Task<T> {
    // Unevaluated upstream is released with a work list; the thunks only
    // hold weak handles, so each node drops shallowly once its deps are
    // detached.
    fn drop(&mut self) {
        let mut stack = match self.state.get_mut() {
            TaskState::Pending { deps, .. } => std::mem::take(deps),
            _ => return,
        };
        while let Some(node) = stack.pop() {
            if Arc::strong_count(&node) == 1 {
                stack.extend(node.take_deps());
            }
        }
    }
}

/// Shared handle to a lazily computed value.
pub struct Delayed<T> {
    task: Arc<Task<T>>,
}

impl<T> Clone for Delayed<T> {
    fn clone(&self) -> Self {
        Self {
            task: Arc::clone(&self.task),
        }
    }
}

impl<T> fmt::Debug for Delayed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delayed")
            .field("id", &self.task.id)
            .field("name", &self.task.name)
            .field("evaluated", &self.is_evaluated())
            .finish()
    }
}

impl<T: Clone + Send + 'static> Delayed<T> {
    /// Record a task without dependencies; `thunk` runs on the first
    /// [`Delayed::compute`].
    pub fn new<F>(name: impl Into<String>, thunk: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        Self::pending(name.into(), Box::new(thunk), Vec::new())
    }

    /// Record a task that runs `f` on the results of `deps`, in order.
    ///
    /// The dependencies are evaluated first; a failed dependency fails this
    /// task with the same error.
    pub fn after<D, F>(name: impl Into<String>, deps: Vec<Delayed<D>>, f: F) -> Self
    where
        D: Clone + Send + 'static,
        F: FnOnce(Vec<D>) -> Result<T> + Send + 'static,
    {
        let inputs: Vec<Weak<Task<D>>> = deps.iter().map(|d| Arc::downgrade(&d.task)).collect();
        let nodes: Vec<Arc<dyn Node>> = deps
            .into_iter()
            .map(|d| d.task as Arc<dyn Node>)
            .collect();
        let thunk = move || {
            let values = inputs
                .iter()
                .map(|input| match input.upgrade() {
                    Some(task) => Delayed { task }.cached(),
                    None => Err(BlockExprError::Usage("dependency released before use".into())),
                })
                .collect::<Result<Vec<_>>>()?;
            f(values)
        };
        Self::pending(name.into(), Box::new(thunk), nodes)
    }

    /// An already evaluated task.
    pub fn from_value(name: impl Into<String>, value: T) -> Self {
        Self::with_state(name.into(), TaskState::Done(Ok(value)))
    }

    fn pending(name: String, thunk: Thunk<T>, deps: Vec<Arc<dyn Node>>) -> Self {
        Self::with_state(name, TaskState::Pending { thunk, deps })
    }

    fn with_state(name: String, state: TaskState<T>) -> Self {
        Self {
            task: Arc::new(Task {
                id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
                name,
                state: Mutex::new(state),
            }),
        }
    }

    /// A task applying `f` to the result of `self`.
    pub fn map<U, F>(&self, name: impl Into<String>, f: F) -> Delayed<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        Delayed::after(name, vec![self.clone()], move |mut values| match values.pop() {
            Some(value) => f(value),
            None => Err(BlockExprError::Usage("map without an input".into())),
        })
    }

    /// Evaluate this task (and whatever it depends on) once, then return the
    /// cached result.
    pub fn compute(&self) -> Result<T> {
        let mut stack: Vec<Arc<dyn Node>> = vec![Arc::clone(&self.task) as Arc<dyn Node>];
        while let Some(top) = stack.last() {
            let pending = top.pending_deps();
            if pending.is_empty() {
                if let Some(node) = stack.pop() {
                    node.run();
                }
            } else {
                stack.extend(pending);
            }
        }
        self.cached()
    }

    /// Result of a task that the walk has already finished.
    fn cached(&self) -> Result<T> {
        match &*self.task.state.lock() {
            TaskState::Done(result) => result.clone(),
            // Only reachable when an earlier evaluation panicked.
            _ => Err(BlockExprError::Usage(format!(
                "task '{}' did not finish an earlier evaluation",
                self.task.name
            ))),
        }
    }
}

impl<T> Delayed<T> {
    pub fn id(&self) -> u64 {
        self.task.id
    }

    pub fn name(&self) -> &str {
        &self.task.name
    }

    pub fn is_evaluated(&self) -> bool {
        matches!(*self.task.state.lock(), TaskState::Done(_))
    }

    /// Whether both handles refer to the same task.
    pub fn same_task(&self, other: &Delayed<T>) -> bool {
        Arc::ptr_eq(&self.task, &other.task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_runs_once_and_caches() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let task = Delayed::new("count", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        });
        assert!(!task.is_evaluated());
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        let doubled = task.map("double", |x| Ok(x * 2));
        assert_eq!(doubled.compute().unwrap(), 14);
        assert_eq!(task.compute().unwrap(), 7);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(task.is_evaluated());
    }

    #[test]
    fn test_errors_are_memoised() {
        let task: Delayed<i32> =
            Delayed::new("fail", || Err(BlockExprError::Unsupported("nope".into())));
        let downstream = task.map("after", |x| Ok(x + 1));
        assert!(downstream.compute().is_err());
        assert!(task.is_evaluated());
        assert_eq!(
            task.compute().unwrap_err(),
            BlockExprError::Unsupported("nope".into())
        );
    }

    #[test]
    fn test_shared_dependency_runs_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let base = Delayed::new("base", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(3)
        });
        let left = base.map("left", |x| Ok(x + 1));
        let right = base.map("right", |x| Ok(x * 10));
        let joined = Delayed::after("join", vec![left, right, base], |v: Vec<i32>| {
            Ok(v.iter().sum::<i32>())
        });
        assert_eq!(joined.compute().unwrap(), 4 + 30 + 3);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_long_chain_evaluates_without_recursion() {
        let mut task = Delayed::from_value("start", 0u64);
        for i in 0..200_000 {
            task = task.map(format!("step-{i}"), |x| Ok(x + 1));
        }
        assert_eq!(task.compute().unwrap(), 200_000);
    }

    #[test]
    fn test_long_unevaluated_chain_drops_without_recursion() {
        let start = Delayed::from_value("start", 0u64);
        let mut task = start.clone();
        for i in 0..200_000 {
            task = task.map(format!("step-{i}"), |x| Ok(x + 1));
        }
        assert!(!task.is_evaluated());
        drop(task);
        assert_eq!(start.compute().unwrap(), 0);
    }

    #[test]
    fn test_dependency_outlives_its_handles() {
        let base = Delayed::new("base", || Ok(20));
        let sum = Delayed::after("sum", vec![base.clone(), base], |v: Vec<i32>| {
            Ok(v.iter().sum::<i32>())
        });
        assert_eq!(sum.compute().unwrap(), 40);
    }
}
