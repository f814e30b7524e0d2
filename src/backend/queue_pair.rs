//! Queue-pair enable/disable.

use super::{RequestArg, VhostBackend};
use crate::error::Result;
use crate::protocol::{RequestCode, VringState};

/// Toggle vrings `2 * pair` and `2 * pair + 1` with two `SET_VRING_ENABLE` requests.
///
/// Stops at the first failure. If the second request fails, the first ring
/// stays in its new state; nothing is rolled back.
pub fn enable_queue_pair<B: VhostBackend + ?Sized>(
    backend: &mut B,
    pair: u16,
    enable: bool,
) -> Result<()> {
    for i in 0..2 {
        let state = VringState::new(u32::from(pair) * 2 + i, u32::from(enable));
        backend.send_request(RequestCode::SetVringEnable, &mut RequestArg::VringState(state))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(RequestCode, VringState)>,
        fail_at: Option<usize>,
    }

    impl VhostBackend for Recorder {
        fn send_request(&mut self, request: RequestCode, arg: &mut RequestArg<'_>) -> Result<()> {
            if self.fail_at == Some(self.calls.len()) {
                return Err(Error::NotConnected);
            }
            let RequestArg::VringState(state) = *arg else {
                panic!("unexpected argument {arg:?}");
            };
            self.calls.push((request, state));
            Ok(())
        }
    }

    #[test]
    fn test_enable_pair_two() {
        let mut backend = Recorder::default();
        backend.enable_queue_pair(2, true).unwrap();
        assert_eq!(
            backend.calls,
            vec![
                (RequestCode::SetVringEnable, VringState::new(4, 1)),
                (RequestCode::SetVringEnable, VringState::new(5, 1)),
            ]
        );
    }

    #[test]
    fn test_disable_pair() {
        let mut backend = Recorder::default();
        enable_queue_pair(&mut backend, 0, false).unwrap();
        assert_eq!(backend.calls[0].1, VringState::new(0, 0));
        assert_eq!(backend.calls[1].1, VringState::new(1, 0));
    }

    #[test]
    fn test_first_failure_skips_second() {
        let mut backend = Recorder {
            fail_at: Some(0),
            ..Default::default()
        };
        assert!(backend.enable_queue_pair(1, true).is_err());
        assert!(backend.calls.is_empty());
    }

    #[test]
    fn test_second_failure_keeps_first() {
        let mut backend = Recorder {
            fail_at: Some(1),
            ..Default::default()
        };
        assert!(backend.enable_queue_pair(1, true).is_err());
        assert_eq!(backend.calls, vec![(RequestCode::SetVringEnable, VringState::new(2, 1))]);
    }
}
