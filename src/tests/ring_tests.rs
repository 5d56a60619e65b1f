/// 资源环测试模块
/// 测试无死锁、互斥、获取顺序以及失败时的资源释放
use crate::{
    BoxError, ParticipantState, ResourceRing, RingError, RingHooks, acquisition_order,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::thread;
use std::time::Duration;

/// Hooks that keep their own ownership table and record every violation
/// instead of panicking inside the ring.
struct Recorder {
    participants: usize,
    owners: Mutex<Vec<Option<usize>>>,
    // Per participant, the resources in the order they were acquired.
    sequences: Mutex<Vec<Vec<usize>>>,
    violations: AtomicUsize,
    holds: AtomicUsize,
}

impl Recorder {
    fn new(participants: usize) -> Arc<Self> {
        Arc::new(Self {
            participants,
            owners: Mutex::new(vec![None; participants]),
            sequences: Mutex::new(vec![Vec::new(); participants]),
            violations: AtomicUsize::new(0),
            holds: AtomicUsize::new(0),
        })
    }

    fn violations(&self) -> usize {
        self.violations.load(Ordering::SeqCst)
    }
}

impl RingHooks for Recorder {
    fn acquired(&self, participant: usize, resource: usize) {
        let mut owners = self.owners.lock().unwrap();
        if owners[resource].is_some() {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        owners[resource] = Some(participant);
        drop(owners);
        self.sequences.lock().unwrap()[participant].push(resource);
    }

    fn releasing(&self, participant: usize, resource: usize) {
        let mut owners = self.owners.lock().unwrap();
        if owners[resource] != Some(participant) {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        owners[resource] = None;
    }

    fn hold(&self, participant: usize, _iteration: usize) -> Result<(), BoxError> {
        let owners = self.owners.lock().unwrap();
        let next = (participant + 1) % self.participants;
        if owners[participant] != Some(participant) || owners[next] != Some(participant) {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        self.holds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn quick_ring(participants: usize, iterations: usize, hooks: Arc<Recorder>) -> ResourceRing {
    ResourceRing::builder()
        .participants(participants)
        .iterations(iterations)
        .think_time(Duration::ZERO, Duration::from_micros(100))
        .hold_time(Duration::ZERO, Duration::from_micros(100))
        .hooks(hooks)
        .build()
        .unwrap()
}

fn spawn_all(ring: &Arc<ResourceRing>) -> Vec<thread::JoinHandle<Result<(), RingError>>> {
    (0..ring.participants())
        .map(|participant| {
            let ring = Arc::clone(ring);
            thread::spawn(move || ring.run(participant))
        })
        .collect()
}

/// 测试1: 不同环大小下运行至完成，不会死锁 (N ∈ {2, 3, 5, 10})
#[test]
fn test_ring_terminates_for_various_sizes() {
    for participants in [2, 3, 5, 10] {
        let recorder = Recorder::new(participants);
        let ring = Arc::new(quick_ring(participants, 20, Arc::clone(&recorder)));
        let handles = spawn_all(&ring);

        assert!(
            ring.await_all_participants_timeout(Duration::from_secs(30)),
            "ring of {participants} did not finish: possible deadlock"
        );
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(ring.holds_completed(), participants * 20);
        assert_eq!(recorder.violations(), 0);
    }
}

/// 测试2: 零思考时间下的高竞争，仍保持互斥
#[test]
fn test_mutual_exclusion_under_contention() {
    let recorder = Recorder::new(5);
    let ring = ResourceRing::builder()
        .participants(5)
        .iterations(200)
        .think_time(Duration::ZERO, Duration::ZERO)
        .hold_time(Duration::ZERO, Duration::ZERO)
        .hooks(Arc::clone(&recorder))
        .build()
        .unwrap();

    ring.run_all().unwrap();

    assert_eq!(recorder.violations(), 0);
    assert_eq!(recorder.holds.load(Ordering::SeqCst), 1000);
    assert!(recorder.owners.lock().unwrap().iter().all(Option::is_none));
}

/// 测试3: 获取顺序 —— 最后一位先取资源 0，其余先取自己的槽位
#[test]
fn test_acquisition_order_observed() {
    let participants = 5;
    let iterations = 10;
    let recorder = Recorder::new(participants);
    let ring = quick_ring(participants, iterations, Arc::clone(&recorder));

    ring.run_all().unwrap();

    let sequences = recorder.sequences.lock().unwrap();
    for (participant, sequence) in sequences.iter().enumerate() {
        assert_eq!(sequence.len(), iterations * 2);
        let expected = if participant == participants - 1 {
            [0, participants - 1]
        } else {
            [participant, participant + 1]
        };
        for pair in sequence.chunks(2) {
            assert_eq!(pair, expected, "participant {participant}");
        }
    }
}

/// 测试4: 端到端场景 N = 5, iterations = 5，共 25 次持有
#[test]
fn test_end_to_end_five_by_five() {
    let recorder = Recorder::new(5);
    let ring = Arc::new(quick_ring(5, 5, Arc::clone(&recorder)));

    for participant in 0..5 {
        assert_eq!(ring.state(participant), ParticipantState::Idle);
    }

    let handles = spawn_all(&ring);
    ring.await_all_participants();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(ring.holds_completed(), 25);
    assert_eq!(recorder.holds.load(Ordering::SeqCst), 25);
    assert_eq!(recorder.violations(), 0);
    assert_eq!(ring.finished_participants(), 5);
    for index in 0..5 {
        assert_eq!(ring.holder(index), None);
        assert_eq!(ring.state(index), ParticipantState::Terminated);
    }
}

/// Fails the hold activity of one participant in one iteration.
struct FailingHold {
    participant: usize,
    iteration: usize,
}

impl RingHooks for FailingHold {
    fn hold(&self, participant: usize, iteration: usize) -> Result<(), BoxError> {
        if participant == self.participant && iteration == self.iteration {
            return Err("simulated hold failure".into());
        }
        Ok(())
    }
}

/// 测试5: 持有阶段失败时仍释放资源，邻居可以完成
#[test]
fn test_hold_failure_releases_resources() {
    let ring = ResourceRing::builder()
        .participants(5)
        .iterations(5)
        .think_time(Duration::ZERO, Duration::ZERO)
        .hold_time(Duration::ZERO, Duration::from_micros(100))
        .hooks(FailingHold {
            participant: 2,
            iteration: 1,
        })
        .build()
        .unwrap();

    let err = ring.run_all().unwrap_err();
    match err {
        RingError::HoldFailed {
            participant,
            iteration,
            ..
        } => {
            assert_eq!(participant, 2);
            assert_eq!(iteration, 1);
        }
        other => panic!("unexpected error: {other}"),
    }

    // 参与者 2 完成了第 0 轮，其余 4 人各完成 5 轮
    assert_eq!(ring.holds_completed(), 21);
    assert_eq!(ring.finished_participants(), 5);
    for index in 0..5 {
        assert_eq!(ring.holder(index), None);
    }
    assert_eq!(ring.state(2), ParticipantState::Terminated);
}

struct PanickingHold;

impl RingHooks for PanickingHold {
    fn hold(&self, participant: usize, _iteration: usize) -> Result<(), BoxError> {
        if participant == 0 {
            panic!("simulated panic while holding");
        }
        Ok(())
    }
}

/// 测试6: 持有阶段 panic 时通过栈展开释放资源
#[test]
fn test_panic_while_holding_releases_resources() {
    let ring = ResourceRing::builder()
        .participants(3)
        .iterations(3)
        .think_time(Duration::ZERO, Duration::ZERO)
        .hold_time(Duration::ZERO, Duration::ZERO)
        .hooks(PanickingHold)
        .build()
        .unwrap();

    let err = ring.run_all().unwrap_err();
    assert!(matches!(err, RingError::ParticipantPanicked { participant: 0 }));
    assert_eq!(err.participant(), 0);

    assert_eq!(ring.holds_completed(), 6);
    assert_eq!(ring.finished_participants(), 3);
    assert_eq!(ring.state(0), ParticipantState::Terminated);
    for index in 0..3 {
        assert_eq!(ring.holder(index), None);
    }
}

/// 测试7: 超时获取失败时释放已持有的第一个资源
#[test]
fn test_acquire_timeout_releases_first_resource() {
    let ring = ResourceRing::builder().participants(3).build().unwrap();

    // 参与者 1 持有资源 1 和 2
    let held = ring.acquire_both(1).unwrap();
    assert_eq!(held.held(), &[1, 2]);

    // 参与者 2 的顺序是 [0, 2]：拿到 0 之后在 2 上超时
    let err = ring
        .acquire_both_timeout(2, Duration::from_millis(20))
        .err()
        .unwrap();
    match err {
        RingError::AcquireTimeout {
            participant,
            resource,
            ..
        } => {
            assert_eq!(participant, 2);
            assert_eq!(resource, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(ring.holder(0), None);
    assert_eq!(ring.holder(1), Some(1));
    assert_eq!(ring.holder(2), Some(1));

    drop(held);
    assert_eq!(ring.holder(1), None);
    assert_eq!(ring.holder(2), None);

    let pair = ring.acquire_both_timeout(2, Duration::from_millis(20)).unwrap();
    assert_eq!(pair.held(), &[0, 2]);
    assert_eq!(pair.participant(), 2);
}

/// 测试8: 配置了获取超时的参与者在资源被占用时以错误结束
#[test]
fn test_run_with_acquire_timeout_fails_cleanly() {
    let ring = ResourceRing::builder()
        .participants(2)
        .iterations(3)
        .think_time(Duration::ZERO, Duration::ZERO)
        .hold_time(Duration::ZERO, Duration::ZERO)
        .acquire_timeout(Duration::from_millis(20))
        .build()
        .unwrap();

    let blocker = ring.acquire_both(0).unwrap();
    let err = ring.run(1).unwrap_err();
    assert!(matches!(err, RingError::AcquireTimeout { participant: 1, .. }));
    assert_eq!(ring.finished_participants(), 1);
    assert_eq!(ring.state(1), ParticipantState::Terminated);
    drop(blocker);

    ring.run(0).unwrap();
    assert_eq!(ring.finished_participants(), 2);
    assert!(ring.await_all_participants_timeout(Duration::from_millis(10)));
}

/// 测试9: 同一参与者不能运行两次，越界索引被拒绝
#[test]
fn test_run_rejects_bad_indices() {
    let ring = ResourceRing::builder()
        .participants(2)
        .iterations(1)
        .think_time(Duration::ZERO, Duration::ZERO)
        .hold_time(Duration::ZERO, Duration::ZERO)
        .build()
        .unwrap();

    assert!(matches!(
        ring.run(2),
        Err(RingError::ParticipantOutOfRange {
            participant: 2,
            participants: 2
        })
    ));
    assert!(ring.acquire_both(5).is_err());

    ring.run(0).unwrap();
    assert!(matches!(ring.run(0), Err(RingError::AlreadyStarted { participant: 0 })));
    assert_eq!(ring.finished_participants(), 1);
    assert!(!ring.await_all_participants_timeout(Duration::from_millis(10)));
}

/// 测试10: 获取顺序函数
#[test]
fn test_acquisition_order_function() {
    for participants in [2, 3, 5, 10] {
        for participant in 0..participants {
            let order = acquisition_order(participant, participants);
            // 总是按索引递增的顺序获取
            assert!(order[0] < order[1]);
            if participant == participants - 1 {
                assert_eq!(order, [0, participants - 1]);
            } else {
                assert_eq!(order, [participant, participant + 1]);
            }
        }
    }
}

struct PanicOnReleasing;

impl RingHooks for PanicOnReleasing {
    fn releasing(&self, participant: usize, _resource: usize) {
        if participant == 0 {
            panic!("simulated panic while releasing");
        }
    }
}

/// 测试11: releasing 回调 panic 时资源仍被释放，邻居可以继续运行
#[test]
fn test_panicking_release_hook_still_frees_resources() {
    let ring = ResourceRing::builder()
        .participants(2)
        .iterations(3)
        .think_time(Duration::ZERO, Duration::ZERO)
        .hold_time(Duration::ZERO, Duration::ZERO)
        .hooks(PanicOnReleasing)
        .build()
        .unwrap();

    let err = ring.run_all().unwrap_err();
    assert!(matches!(err, RingError::ParticipantPanicked { participant: 0 }));

    assert_eq!(ring.holder(0), None);
    assert_eq!(ring.holder(1), None);
    // 参与者 0 完成一次持有后在释放时 panic，参与者 1 完成全部 3 轮
    assert_eq!(ring.holds_completed(), 4);
    assert_eq!(ring.state(0), ParticipantState::Terminated);
    assert_eq!(ring.state(1), ParticipantState::Terminated);
    assert!(ring.await_all_participants_timeout(Duration::from_secs(2)));
}

/// Hooks that check the participant's published state at every callback.
#[derive(Default)]
struct StateWatcher {
    ring: OnceLock<Weak<ResourceRing>>,
    mismatches: AtomicUsize,
    holds: AtomicUsize,
}

impl StateWatcher {
    fn expect(&self, participant: usize, expected: ParticipantState) -> Option<Arc<ResourceRing>> {
        let Some(ring) = self.ring.get().and_then(Weak::upgrade) else {
            self.mismatches.fetch_add(1, Ordering::SeqCst);
            return None;
        };
        if ring.state(participant) != expected {
            self.mismatches.fetch_add(1, Ordering::SeqCst);
        }
        Some(ring)
    }
}

impl RingHooks for StateWatcher {
    fn acquired(&self, participant: usize, _resource: usize) {
        self.expect(participant, ParticipantState::Acquiring);
    }

    fn releasing(&self, participant: usize, _resource: usize) {
        self.expect(participant, ParticipantState::Releasing);
    }

    fn hold(&self, participant: usize, _iteration: usize) -> Result<(), BoxError> {
        if let Some(ring) = self.expect(participant, ParticipantState::Holding) {
            // 两侧邻居各与本参与者共享一个资源，不可能同时处于持有状态
            let participants = ring.participants();
            let left = (participant + participants - 1) % participants;
            let right = (participant + 1) % participants;
            for neighbour in [left, right] {
                if ring.state(neighbour) == ParticipantState::Holding {
                    self.mismatches.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
        self.holds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 测试12: 参与者状态按 思考/获取/持有/释放 推进，结束后为 Terminated
#[test]
fn test_participant_state_transitions() {
    let watcher = Arc::new(StateWatcher::default());
    let ring = Arc::new(
        ResourceRing::builder()
            .participants(5)
            .iterations(20)
            .think_time(Duration::ZERO, Duration::from_micros(100))
            .hold_time(Duration::ZERO, Duration::from_micros(100))
            .hooks(Arc::clone(&watcher))
            .build()
            .unwrap(),
    );
    watcher.ring.set(Arc::downgrade(&ring)).unwrap();

    for participant in 0..5 {
        assert_eq!(ring.state(participant), ParticipantState::Idle);
    }

    for handle in spawn_all(&ring) {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(watcher.mismatches.load(Ordering::SeqCst), 0);
    assert_eq!(watcher.holds.load(Ordering::SeqCst), 100);
    for participant in 0..5 {
        assert_eq!(ring.state(participant), ParticipantState::Terminated);
    }
}

/// 测试13: 思考阶段对外可见
#[test]
fn test_thinking_state_is_observable() {
    let ring = Arc::new(
        ResourceRing::builder()
            .participants(2)
            .iterations(1)
            .think_time(Duration::from_millis(300), Duration::from_millis(300))
            .hold_time(Duration::ZERO, Duration::ZERO)
            .build()
            .unwrap(),
    );

    let runner = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || ring.run(0))
    };
    thread::sleep(Duration::from_millis(50));
    assert_eq!(ring.state(0), ParticipantState::Thinking);
    assert_eq!(ring.state(1), ParticipantState::Idle);

    runner.join().unwrap().unwrap();
    assert_eq!(ring.state(0), ParticipantState::Terminated);
}

/// 测试14: 超大超时时长退化为无限等待，而不是溢出 panic
#[test]
fn test_unbounded_timeouts_wait_without_deadline() {
    let ring = ResourceRing::builder()
        .participants(3)
        .iterations(5)
        .think_time(Duration::ZERO, Duration::ZERO)
        .hold_time(Duration::ZERO, Duration::ZERO)
        .acquire_timeout(Duration::MAX)
        .build()
        .unwrap();

    ring.run_all().unwrap();
    assert_eq!(ring.holds_completed(), 15);
    assert!(ring.await_all_participants_timeout(Duration::MAX));

    let pair = ring.acquire_both_timeout(1, Duration::MAX).unwrap();
    assert_eq!(pair.held(), &[1, 2]);
}
