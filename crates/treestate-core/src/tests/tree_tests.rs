use super::*;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Default)]
struct QueuedScheduler {
    tasks: Mutex<VecDeque<WorkerTask>>,
}

impl QueuedScheduler {
    fn queued(&self) -> usize {
        self.tasks.lock().len()
    }

    fn run_one(&self) -> bool {
        let task = self.tasks.lock().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }
}

impl WorkerScheduler for QueuedScheduler {
    fn post_to_worker(&self, task: WorkerTask) -> Result<(), WorkerUnavailable> {
        self.tasks.lock().push_back(task);
        Ok(())
    }
}

struct ClosedScheduler;

impl WorkerScheduler for ClosedScheduler {
    fn post_to_worker(&self, _task: WorkerTask) -> Result<(), WorkerUnavailable> {
        Err(WorkerUnavailable)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Count(i32);

fn increment() -> StateUpdate {
    StateUpdate::labeled("increment", |count: &Count, _: &Component| {
        Count(count.0 + 1)
    })
}

fn counter_tree(context: &ComponentContext) -> Component {
    let root_type = ComponentLifecycle::stateless(100, "Root").build();
    let counter = ComponentLifecycle::stateful(1, "Counter", |_| Count(4)).build();
    Component::builder(context, &root_type)
        .child(Component::new(context, &counter))
        .build()
}

fn queued_tree() -> (ComponentTree, Arc<QueuedScheduler>) {
    let context = ComponentContext::new();
    let scheduler = Arc::new(QueuedScheduler::default());
    let tree = ComponentTree::builder(&context, counter_tree(&context))
        .scheduler(scheduler.clone())
        .build();
    (tree, scheduler)
}

#[test]
fn nothing_commits_before_a_size_is_set() {
    let (tree, scheduler) = queued_tree();
    tree.update_state_async("100,1", increment());
    assert!(scheduler.run_one());
    assert_eq!(tree.generation(), 0);
    assert_eq!(tree.pending_update_count("100,1"), 1);
    assert_eq!(tree.phase(), RebuildPhase::Idle);
}

#[test]
fn updates_before_the_worker_runs_share_one_rebuild() {
    let (tree, scheduler) = queued_tree();
    tree.set_size(Size::new(100.0, 100.0)).unwrap();
    assert_eq!(tree.generation(), 1);

    tree.update_state_async("100,1", increment());
    assert_eq!(tree.phase(), RebuildPhase::Scheduled);
    tree.update_state_async("100,1", increment());
    tree.update_state_async("100,1", increment());
    assert_eq!(scheduler.queued(), 1);
    assert_eq!(tree.pending_update_count("100,1"), 3);

    assert!(scheduler.run_one());
    assert!(!scheduler.run_one());
    assert_eq!(tree.generation(), 2);
    assert_eq!(tree.phase(), RebuildPhase::Idle);
    assert_eq!(tree.committed_state_as::<Count>("100,1"), Some(Count(7)));
    assert_eq!(tree.pending_update_count("100,1"), 0);
}

#[derive(Default)]
struct ReentrantLayout {
    tree: Mutex<Option<ComponentTree>>,
    fired: Mutex<bool>,
}

impl LayoutEngine for ReentrantLayout {
    fn run_layout(&self, tree: &ResolvedTree, size: Size) -> Result<LaidOutTree, LayoutError> {
        let owner = self.tree.lock().clone();
        let mut fired = self.fired.lock();
        if let Some(owner) = owner {
            if !*fired {
                *fired = true;
                assert_eq!(owner.phase(), RebuildPhase::Running);
                owner.update_state_async("100,1", increment());
            }
        }
        PassthroughLayout.run_layout(tree, size)
    }
}

#[test]
fn update_during_running_rebuild_schedules_a_follow_up() {
    let context = ComponentContext::new();
    let scheduler = Arc::new(QueuedScheduler::default());
    let layout = Arc::new(ReentrantLayout::default());
    let tree = ComponentTree::builder(&context, counter_tree(&context))
        .scheduler(scheduler.clone())
        .layout_engine(layout.clone())
        .size(Size::new(10.0, 10.0))
        .build();
    *layout.tree.lock() = Some(tree.clone());

    tree.update_state_async("100,1", increment());
    assert!(scheduler.run_one());
    assert_eq!(tree.generation(), 1);
    assert_eq!(tree.committed_state_as::<Count>("100,1"), Some(Count(5)));
    assert_eq!(tree.pending_update_count("100,1"), 1);
    assert_eq!(tree.phase(), RebuildPhase::Scheduled);
    assert_eq!(scheduler.queued(), 1);

    assert!(scheduler.run_one());
    assert_eq!(tree.generation(), 2);
    assert_eq!(tree.committed_state_as::<Count>("100,1"), Some(Count(6)));
    assert_eq!(tree.phase(), RebuildPhase::Idle);
    *layout.tree.lock() = None;
}

#[test]
fn released_tree_ignores_queued_rebuilds() {
    let (tree, scheduler) = queued_tree();
    tree.set_size(Size::new(1.0, 1.0)).unwrap();
    tree.update_state_async("100,1", increment());
    tree.release();
    assert!(scheduler.run_one());
    assert_eq!(tree.generation(), 1);
    assert!(tree.take_rebuild_error().is_none());
    assert_eq!(tree.set_size(Size::new(2.0, 2.0)), Err(RebuildError::Released));
}

#[test]
fn dropped_tree_turns_queued_rebuild_into_noop() {
    let (tree, scheduler) = queued_tree();
    tree.set_size_async(Size::new(1.0, 1.0));
    drop(tree);
    assert!(scheduler.run_one());
}

#[test]
fn panicking_update_resets_phase_and_is_reported() {
    let (tree, scheduler) = queued_tree();
    tree.set_size(Size::new(10.0, 10.0)).unwrap();
    tree.update_state_async(
        "100,1",
        StateUpdate::new(|_: &Count, _: &Component| -> Count { panic!("bad update") }),
    );
    assert!(scheduler.run_one());

    assert_eq!(tree.phase(), RebuildPhase::Idle);
    assert_eq!(
        tree.take_rebuild_error(),
        Some(RebuildError::Panicked("bad update".to_string()))
    );
    assert_eq!(tree.pending_update_count("100,1"), 1);

    assert_eq!(tree.clear_pending_updates("100,1"), 1);
    tree.update_state_async("100,1", increment());
    assert_eq!(tree.phase(), RebuildPhase::Scheduled);
    assert!(scheduler.run_one());
    assert_eq!(tree.generation(), 2);
    assert_eq!(tree.committed_state_as::<Count>("100,1"), Some(Count(5)));
}

#[test]
fn rejected_post_returns_to_idle() {
    let context = ComponentContext::new();
    let tree = ComponentTree::builder(&context, counter_tree(&context))
        .scheduler(Arc::new(ClosedScheduler))
        .size(Size::new(10.0, 10.0))
        .build();

    tree.update_state_async("100,1", increment());
    assert_eq!(tree.phase(), RebuildPhase::Idle);
    assert_eq!(
        tree.take_rebuild_error(),
        Some(RebuildError::Worker(WorkerUnavailable))
    );
    assert_eq!(tree.pending_update_count("100,1"), 1);

    tree.set_size(Size::new(10.0, 10.0)).unwrap();
    assert_eq!(tree.committed_state_as::<Count>("100,1"), Some(Count(5)));
}
