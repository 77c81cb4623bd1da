//! Schedule computation: a pure function from source shape to polling
//! parameters. Same inputs always produce the same outputs.

use chrono::{DateTime, Datelike, Timelike, Utc};

use newsriver_common::PriorityTier;

/// Cap for any computed interval or backoff.
const MAX_INTERVAL_MINUTES: u32 = 24 * 60;

/// Inputs the computation cares about.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleInputs {
    pub tier: PriorityTier,
    /// Requests per second the source tolerates.
    pub rate_limit: u32,
    pub max_depth: i32,
    pub failure_count: u32,
}

/// Computed polling parameters for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub interval_minutes: u32,
    /// Numeric priority used by the dispatcher ordering.
    pub priority: i32,
    pub max_concurrent: i32,
    /// Startup stagger so a fleet of new jobs doesn't fire at once.
    pub initial_delay_minutes: u32,
}

pub fn compute_schedule(inputs: ScheduleInputs) -> Schedule {
    let base: f64 = match inputs.tier {
        PriorityTier::Critical => 15.0,
        PriorityTier::High => 30.0,
        PriorityTier::Normal => 60.0,
        PriorityTier::Low => 180.0,
    };

    let rate_factor = match inputs.rate_limit {
        0..=5 => 1.5,
        6..=10 => 1.0,
        11..=20 => 0.75,
        _ => 0.5,
    };

    let depth_factor = match inputs.max_depth {
        i32::MIN..=2 => 1.0,
        3..=5 => 1.25,
        _ => 1.5,
    };

    let mut interval = (base * rate_factor * depth_factor).round() as u32;

    // Failure backoff doubles per consecutive failure, capped at 24 hours.
    let shift = inputs.failure_count.min(11);
    interval = interval
        .saturating_mul(1u32 << shift)
        .min(MAX_INTERVAL_MINUTES);

    let (priority, max_concurrent, initial_delay_minutes) = match inputs.tier {
        PriorityTier::Critical => (100, 3, 0),
        PriorityTier::High => (75, 2, 1),
        PriorityTier::Normal => (50, 1, 5),
        PriorityTier::Low => (25, 1, 10),
    };

    Schedule {
        interval_minutes: interval,
        priority,
        max_concurrent,
        initial_delay_minutes,
    }
}

/// Crawl-window gate. A job with an hour window (possibly overnight)
/// and/or allowed days only executes inside it; outside, the turn is
/// skipped without being consumed. Days use ISO numbering (Monday = 1).
/// Missing hours or an empty day list mean unrestricted.
pub fn in_crawl_window(
    start_hour: Option<i32>,
    end_hour: Option<i32>,
    days: &[i32],
    now: DateTime<Utc>,
) -> bool {
    if !days.is_empty() {
        let today = now.weekday().number_from_monday() as i32;
        if !days.contains(&today) {
            return false;
        }
    }

    match (start_hour, end_hour) {
        (Some(start), Some(end)) => {
            let hour = now.hour() as i32;
            if start <= end {
                hour >= start && hour < end
            } else {
                // Overnight window, e.g. 22–06.
                hour >= start || hour < end
            }
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn inputs(tier: PriorityTier) -> ScheduleInputs {
        ScheduleInputs {
            tier,
            rate_limit: 10,
            max_depth: 2,
            failure_count: 0,
        }
    }

    #[test]
    fn base_intervals_by_tier() {
        assert_eq!(compute_schedule(inputs(PriorityTier::Critical)).interval_minutes, 15);
        assert_eq!(compute_schedule(inputs(PriorityTier::High)).interval_minutes, 30);
        assert_eq!(compute_schedule(inputs(PriorityTier::Normal)).interval_minutes, 60);
        assert_eq!(compute_schedule(inputs(PriorityTier::Low)).interval_minutes, 180);
    }

    #[test]
    fn slow_sources_get_longer_intervals() {
        let slow = ScheduleInputs {
            rate_limit: 3,
            ..inputs(PriorityTier::Normal)
        };
        assert_eq!(compute_schedule(slow).interval_minutes, 90); // 60 * 1.5

        let fast = ScheduleInputs {
            rate_limit: 25,
            ..inputs(PriorityTier::Normal)
        };
        assert_eq!(compute_schedule(fast).interval_minutes, 30); // 60 * 0.5
    }

    #[test]
    fn deep_crawls_get_longer_intervals() {
        let mid = ScheduleInputs {
            max_depth: 4,
            ..inputs(PriorityTier::Normal)
        };
        assert_eq!(compute_schedule(mid).interval_minutes, 75); // 60 * 1.25

        let deep = ScheduleInputs {
            max_depth: 8,
            ..inputs(PriorityTier::Normal)
        };
        assert_eq!(compute_schedule(deep).interval_minutes, 90); // 60 * 1.5
    }

    #[test]
    fn failure_backoff_doubles_and_caps() {
        let once = ScheduleInputs {
            failure_count: 1,
            ..inputs(PriorityTier::Normal)
        };
        assert_eq!(compute_schedule(once).interval_minutes, 120);

        let thrice = ScheduleInputs {
            failure_count: 3,
            ..inputs(PriorityTier::Normal)
        };
        assert_eq!(compute_schedule(thrice).interval_minutes, 480);

        let many = ScheduleInputs {
            failure_count: 20,
            ..inputs(PriorityTier::Normal)
        };
        assert_eq!(compute_schedule(many).interval_minutes, 24 * 60);
    }

    #[test]
    fn numeric_priority_and_concurrency_by_tier() {
        let critical = compute_schedule(inputs(PriorityTier::Critical));
        assert_eq!((critical.priority, critical.max_concurrent), (100, 3));
        let high = compute_schedule(inputs(PriorityTier::High));
        assert_eq!((high.priority, high.max_concurrent), (75, 2));
        let normal = compute_schedule(inputs(PriorityTier::Normal));
        assert_eq!((normal.priority, normal.max_concurrent), (50, 1));
        let low = compute_schedule(inputs(PriorityTier::Low));
        assert_eq!((low.priority, low.max_concurrent), (25, 1));
    }

    #[test]
    fn initial_delay_staggers_startup() {
        assert_eq!(compute_schedule(inputs(PriorityTier::Critical)).initial_delay_minutes, 0);
        assert_eq!(compute_schedule(inputs(PriorityTier::High)).initial_delay_minutes, 1);
        assert_eq!(compute_schedule(inputs(PriorityTier::Normal)).initial_delay_minutes, 5);
        assert_eq!(compute_schedule(inputs(PriorityTier::Low)).initial_delay_minutes, 10);
    }

    #[test]
    fn computation_is_deterministic() {
        let i = ScheduleInputs {
            tier: PriorityTier::High,
            rate_limit: 7,
            max_depth: 4,
            failure_count: 2,
        };
        assert_eq!(compute_schedule(i), compute_schedule(i));
    }

    // --- crawl window ---

    fn at(hour: u32) -> DateTime<Utc> {
        // 2024-06-05 is a Wednesday (ISO day 3).
        Utc.with_ymd_and_hms(2024, 6, 5, hour, 30, 0).unwrap()
    }

    #[test]
    fn no_window_always_allows() {
        assert!(in_crawl_window(None, None, &[], at(3)));
    }

    #[test]
    fn daytime_window() {
        assert!(in_crawl_window(Some(9), Some(17), &[], at(12)));
        assert!(!in_crawl_window(Some(9), Some(17), &[], at(20)));
        assert!(!in_crawl_window(Some(9), Some(17), &[], at(17)), "end is exclusive");
    }

    #[test]
    fn overnight_window_wraps_midnight() {
        assert!(in_crawl_window(Some(22), Some(6), &[], at(23)));
        assert!(in_crawl_window(Some(22), Some(6), &[], at(2)));
        assert!(!in_crawl_window(Some(22), Some(6), &[], at(12)));
    }

    #[test]
    fn day_restriction() {
        // Wednesday is day 3.
        assert!(in_crawl_window(None, None, &[1, 3, 5], at(12)));
        assert!(!in_crawl_window(None, None, &[6, 7], at(12)));
    }

    #[test]
    fn days_and_hours_combine() {
        assert!(in_crawl_window(Some(9), Some(17), &[3], at(10)));
        assert!(!in_crawl_window(Some(9), Some(17), &[3], at(20)));
        assert!(!in_crawl_window(Some(9), Some(17), &[4], at(10)));
    }
}
