use std::collections::BinaryHeap;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::interval;
use tokio::time::{Duration, Instant};

use crate::algorithms::Algorithm;
use crate::cache::Cache;
use crate::models::{Assignment, BackOffPod, PodNameWithPriority};
use crate::models::{NodeInfo, PodInfo};

pub struct Scheduler<A: Algorithm> {
    cache: Arc<RwLock<Cache>>,
    queue: Arc<SchedulingQueue>,
    _algorithm: PhantomData<A>,
}

type ActiveQueue = Arc<Mutex<BinaryHeap<PodNameWithPriority>>>;
type BackoffQueue = Arc<Mutex<BinaryHeap<BackOffPod>>>;
type UnschedulableQueue = Arc<Mutex<Vec<(BackOffPod, Instant)>>>;

pub struct SchedulingQueue {
    active_queue: ActiveQueue,
    backoff_queue: BackoffQueue,
    unschedulable_queue: UnschedulableQueue,
    /// Used for waiting for state changes when no Pods are schedulable.
    /// Each Pod addition increments the state change counter.
    status_count: Mutex<watch::Receiver<usize>>,
    status_sx: watch::Sender<usize>,
}

impl Default for SchedulingQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulingQueue {
    pub fn new() -> Self {
        let (sx, rx) = watch::channel(0);
        Self {
            active_queue: Arc::new(Mutex::new(BinaryHeap::new())),
            backoff_queue: Arc::new(Mutex::new(BinaryHeap::new())),
            unschedulable_queue: Arc::new(Mutex::new(Vec::new())),
            status_count: Mutex::new(rx),
            status_sx: sx,
        }
    }

    async fn move_all_to_active_or_backoff(&self) {
        let now = Instant::now();
        let mut active_guard = self.active_queue.lock().await;
        let mut backoff_guard = self.backoff_queue.lock().await;
        self.unschedulable_queue
            .lock()
            .await
            .drain(..)
            .for_each(|p| {
                if p.0.expire >= now {
                    active_guard.push(p.0.pod);
                } else {
                    backoff_guard.push(p.0);
                }
            });
        self.add_count().await;
    }

    async fn next_pod(&self) -> (u64, String) {
        let mut next = self.active_queue.lock().await.pop();
        while next.is_none() {
            let mut status_guard = self.status_count.lock().await;
            status_guard
                .changed()
                .await
                .expect("status_sx closed for unknown reason");
            next = self.active_queue.lock().await.pop();
        }
        next.unwrap()
    }

    async fn flush_backoff_completed(
        active: ActiveQueue,
        backoff: BackoffQueue,
        sx: watch::Sender<usize>,
    ) {
        let now = Instant::now();
        let mut active_guard = active.lock().await;
        let mut backoff_guard = backoff.lock().await;
        while !backoff_guard.is_empty() && backoff_guard.peek().unwrap().expire <= now {
            let pod = backoff_guard.pop().unwrap();
            active_guard.push(pod.pod);
        }
        sx.send_modify(|v| (*v) += 1);
    }

    async fn flush_unschedulable_left_over(
        active: ActiveQueue,
        backoff: BackoffQueue,
        unschedulable: UnschedulableQueue,
        sx: watch::Sender<usize>,
    ) {
        let now = Instant::now();
        let mut active_guard = active.lock().await;
        let mut backoff_guard = backoff.lock().await;
        let mut unschedulable_guard = unschedulable.lock().await;
        unschedulable_guard.drain(..).for_each(|(p, t)| {
            if now - t > Duration::from_secs(5 * 60) {
                if now >= p.expire {
                    active_guard.push(p.pod);
                } else {
                    backoff_guard.push(p);
                }
            }
        });
        sx.send_modify(|v| (*v) += 1);
    }

    fn run(&self) {
        let active_queue = self.active_queue.clone();
        let backoff_queue = self.backoff_queue.clone();
        let status_sx = self.status_sx.clone();
        tokio::spawn(async move {
            let mut timer = interval(Duration::from_secs(1));
            loop {
                Self::flush_backoff_completed(
                    active_queue.clone(),
                    backoff_queue.clone(),
                    status_sx.clone(),
                )
                .await;
                timer.tick().await;
            }
        });

        let active_queue = self.active_queue.clone();
        let backoff_queue = self.backoff_queue.clone();
        let unschedulable_queue = self.unschedulable_queue.clone();
        let status_sx = self.status_sx.clone();
        tokio::spawn(async move {
            let mut timer = interval(Duration::from_secs(30));
            loop {
                Self::flush_unschedulable_left_over(
                    active_queue.clone(),
                    backoff_queue.clone(),
                    unschedulable_queue.clone(),
                    status_sx.clone(),
                )
                .await;
                timer.tick().await;
            }
        });
    }

    async fn add_count(&self) {
        self.status_sx.send_modify(|v| *v += 1);
    }

    async fn push(&self, pod_name: String, priority: u64) {
        let mut guard = self.active_queue.lock().await;
        guard.push((priority, pod_name));
        self.add_count().await;
    }

    async fn push_backoff(&self, mut pod: PodInfo) {
        pod.attempts += 1;
        let expire = Instant::now() + Duration::from_secs(2_u64.pow(pod.attempts as u32));
        let backoff_pod = BackOffPod {
            pod: (pod.priority, pod.name.clone()),
            expire,
        };
        if pod.attempts > 8 {
            let mut guard = self.unschedulable_queue.lock().await;
            guard.push((backoff_pod, Instant::now()));
        } else {
            let mut guard = self.backoff_queue.lock().await;
            guard.push(backoff_pod);
        }
    }
}

impl<A: Algorithm> Default for Scheduler<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Algorithm> Scheduler<A> {
    pub fn new() -> Self {
        Self {
            cache: Arc::new(RwLock::new(Cache::new())),
            queue: Arc::new(SchedulingQueue::new()),
            _algorithm: PhantomData,
        }
    }

    async fn schedule_one(
        cache: Arc<RwLock<Cache>>,
        queue: Arc<SchedulingQueue>,
        res_sx: UnboundedSender<Result<Assignment, anyhow::Error>>,
    ) {
        let (pod_priority, pod_name) = queue.next_pod().await;
        let cache_read = cache.read().await;
        let pod_info = cache_read.get_pod(&pod_name);
        let nodes = cache_read.get_nodes();
        drop(cache_read);
        if let Some(pod_info) = pod_info {
            if pod_info.priority != pod_priority {
                // The pod priority is already updated.
                return;
            }

            let filtered = A::filter(nodes, &pod_info);
            let mut graded = A::grader(filtered, &pod_info);
            graded.sort_by(|a, b| b.1.cmp(&a.1));
            let mut cache_write = cache.write().await;
            if graded.is_empty() {
                if cache_write.add_fail(&pod_name) {
                    queue.push_backoff(pod_info).await;
                }
            } else if cache_write.assign(&pod_name, &graded[0].0.name) {
                res_sx
                    .send(Ok(Assignment {
                        pod_name,
                        node_name: graded[0].0.name.clone(),
                    }))
                    .expect("scheduling result rx closed before scheduler closed");
            }
        }
    }

    pub fn run(&self) -> UnboundedReceiver<Result<Assignment, anyhow::Error>> {
        self.queue.run();
        let queue = self.queue.clone();
        let cache = self.cache.clone();
        let (sx, rx) = unbounded_channel();
        tokio::spawn(async move {
            loop {
                Self::schedule_one(cache.clone(), queue.clone(), sx.clone()).await;
            }
        });
        rx
    }

    /// Only need to call update when an unusual update occurred.
    /// There is no need to update scheduled updates;
    /// cache will update automatically.
    pub async fn update_cache_pod(&mut self, pod: PodInfo) {
        let mut write_lock = self.cache.write().await;
        let ori = (*write_lock).update_pod(pod.clone());
        if pod.scheduled.is_none() {
            if let Some(o) = &ori {
                if o.scheduled.is_some() {
                    self.queue.push(pod.name, pod.priority).await;
                }
            } else {
                self.queue.push(pod.name, pod.priority).await;
            }
        }
    }

    pub async fn remove_cache_pod(&mut self, pod_name: &str) {
        let mut write_lock = self.cache.write().await;
        (*write_lock).remove_pod(pod_name);
    }

    pub async fn add_cache_node(&mut self, node: NodeInfo) {
        let mut write_lock = self.cache.write().await;
        (*write_lock).update_node(node);
        drop(write_lock);
        self.queue.move_all_to_active_or_backoff().await;
    }

    pub async fn remove_cache_node(&mut self, node_name: &str) {
        let mut write_lock = self.cache.write().await;
        let pod_on_to_delete_node = write_lock.pop_pod_on_node(node_name);
        for (priority, name) in pod_on_to_delete_node {
            self.queue.push(name, priority).await;
        }
        (*write_lock).remove_node(node_name);
        drop(write_lock);
        self.queue.move_all_to_active_or_backoff().await;
    }
}
