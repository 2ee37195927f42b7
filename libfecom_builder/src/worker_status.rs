/// Progress message sent by a worker to whoever renders progress
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub run_number: i32,
    pub worker_id: usize,
    pub events_written: u64,
}

impl WorkerStatus {
    pub fn new(progress: f32, run_number: i32, worker_id: usize, events_written: u64) -> Self {
        Self {
            progress,
            run_number,
            worker_id,
            events_written,
        }
    }
}
