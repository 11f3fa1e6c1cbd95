use std::time::Duration;

use tokio_timer::{Sleep, Timer};

/// Timer a handshake session arms its one shot deadline on.
#[derive(Clone)]
pub struct HandshakeTimer {
    timer: Timer,
    duration: Duration,
}

impl HandshakeTimer {
    pub fn new(timer: Timer, duration: Duration) -> HandshakeTimer {
        HandshakeTimer { timer, duration }
    }

    /// Start the deadline; the returned future resolves when it fires and
    /// is cancelled by dropping it.
    pub fn sleep(&self) -> Sleep {
        self.timer.sleep(self.duration)
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::HandshakeTimer;

    use futures::Future;
    use tokio_timer;

    #[test]
    fn positive_deadline_fires() {
        let timer = HandshakeTimer::new(tokio_timer::wheel().build(), Duration::from_millis(50));

        timer.sleep().wait().unwrap();
    }

    #[test]
    fn positive_dropped_deadline_is_cancelled() {
        let timer = HandshakeTimer::new(tokio_timer::wheel().build(), Duration::from_millis(50));

        let sleep = timer.sleep();
        drop(sleep);
    }
}
