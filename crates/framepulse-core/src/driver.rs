use std::thread;
use std::time::Duration;

use log::info;

use crate::clock::{FrameClock, SystemClock};
use crate::scheduler::Scheduler;
use crate::sync::ShutdownToken;

/// Drives a scheduler from the calling thread at its target frame rate.
///
/// Delivers one tick per frame subscription, so unregistering the last
/// callback or calling `stop()` ends the loop. Mutations queued through
/// handles before the call are applied first. Returns the number of ticks
/// delivered.
pub fn run_loop(
    scheduler: &mut Scheduler<SystemClock>,
    shutdown: &ShutdownToken,
    max_frames: Option<u64>,
) -> u64 {
    let mut ticks: u64 = 0;
    scheduler.apply_pending();

    loop {
        if shutdown.is_requested() {
            info!("shutdown requested, leaving frame loop after {ticks} ticks");
            break;
        }
        if let Some(max) = max_frames {
            if ticks >= max {
                info!("reached max_frames={max}, leaving frame loop");
                break;
            }
        }

        if scheduler.clock_mut().take_pending().is_none() {
            break;
        }

        let frame_start = scheduler.clock().now_ms();
        scheduler.tick(frame_start);
        ticks += 1;

        let spent = scheduler.clock().now_ms() - frame_start;
        let remaining = scheduler.target_frame_time_ms() - spent;
        if remaining > 0.0 {
            thread::sleep(Duration::from_secs_f64(remaining / 1000.0));
        }
    }

    ticks
}
