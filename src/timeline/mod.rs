//! 时间线：播放状态机、查看器快捷键、内置示例时间线

pub mod catalog;
pub mod player;
pub mod viewer;

pub use catalog::{category_for, Catalog};
pub use player::{Effect, PlaybackState, PlayerHandle, PlayerPhase, TimelinePlayer, DEFAULT_TICK};
pub use viewer::{KeyCommand, TimelineViewer, ViewerAction};

use thiserror::Error;

use crate::remote::TimelinePoint;

/// 时间线数据不满足约束
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimelineError {
    #[error("Timeline has no points")]
    Empty,

    #[error("First point position must be 0, got {0}")]
    BadStart(f64),

    #[error("Last point position must be 100, got {0}")]
    BadEnd(f64),

    #[error("Position at index {index} is not a finite number")]
    NonFinite { index: usize },

    #[error("Position decreases at index {index}: {prev} -> {next}")]
    Decreasing { index: usize, prev: f64, next: f64 },
}

/// 校验：非空、position 均为有限数、首个为 0、末个为 100、整体非递减
pub fn validate_timeline(points: &[TimelinePoint]) -> Result<(), TimelineError> {
    let first = points.first().ok_or(TimelineError::Empty)?;
    // NaN 与任何值比较都为 false，必须先排除
    if let Some(index) = points.iter().position(|p| !p.position.is_finite()) {
        return Err(TimelineError::NonFinite { index });
    }
    if first.position != 0.0 {
        return Err(TimelineError::BadStart(first.position));
    }
    for (index, pair) in points.windows(2).enumerate() {
        if pair[1].position < pair[0].position {
            return Err(TimelineError::Decreasing {
                index: index + 1,
                prev: pair[0].position,
                next: pair[1].position,
            });
        }
    }
    let last = points.last().ok_or(TimelineError::Empty)?;
    if points.len() > 1 && last.position != 100.0 {
        return Err(TimelineError::BadEnd(last.position));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(positions: &[f64]) -> Vec<TimelinePoint> {
        positions
            .iter()
            .map(|p| TimelinePoint::new("y", "p", "d", "i", *p))
            .collect()
    }

    #[test]
    fn test_valid_timeline() {
        assert!(validate_timeline(&pts(&[0.0, 25.0, 25.0, 100.0])).is_ok());
        assert!(validate_timeline(&pts(&[0.0])).is_ok());
    }

    #[test]
    fn test_invalid_timelines() {
        assert_eq!(validate_timeline(&[]), Err(TimelineError::Empty));
        assert_eq!(validate_timeline(&pts(&[5.0, 100.0])), Err(TimelineError::BadStart(5.0)));
        assert_eq!(validate_timeline(&pts(&[0.0, 90.0])), Err(TimelineError::BadEnd(90.0)));
        assert!(matches!(
            validate_timeline(&pts(&[0.0, 60.0, 40.0, 100.0])),
            Err(TimelineError::Decreasing { index: 2, .. })
        ));
    }

    #[test]
    fn test_non_finite_positions_rejected() {
        assert_eq!(
            validate_timeline(&pts(&[0.0, f64::NAN, 100.0])),
            Err(TimelineError::NonFinite { index: 1 })
        );
        assert_eq!(
            validate_timeline(&pts(&[0.0, f64::INFINITY])),
            Err(TimelineError::NonFinite { index: 1 })
        );
        assert_eq!(
            validate_timeline(&pts(&[f64::NAN])),
            Err(TimelineError::NonFinite { index: 0 })
        );
    }
}
