use crossbeam_channel::{Receiver, Sender, TrySendError, unbounded};

/// Something the player did on their instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerInput {
    Note {
        number: u8,
        velocity: u8,
        is_on: bool,
    },
    Pedal {
        level: u8,
    },
}

/// Producer half, handed to whatever listens to the player's device.
/// Cheap to clone.
#[derive(Debug, Clone)]
pub struct InputSender {
    tx: Sender<PlayerInput>,
}

impl InputSender {
    /// Returns `false` once the playback side has been dropped.
    pub fn send(&self, input: PlayerInput) -> bool {
        !matches!(self.tx.try_send(input), Err(TrySendError::Disconnected(_)))
    }

    pub fn note_on(&self, number: u8, velocity: u8) -> bool {
        self.send(PlayerInput::Note {
            number,
            velocity,
            is_on: true,
        })
    }

    pub fn note_off(&self, number: u8) -> bool {
        self.send(PlayerInput::Note {
            number,
            velocity: 0,
            is_on: false,
        })
    }

    pub fn pedal(&self, level: u8) -> bool {
        self.send(PlayerInput::Pedal { level })
    }
}

/// Consumer half, owned by the playback loop and drained once per tick.
#[derive(Debug)]
pub struct InputQueue {
    rx: Receiver<PlayerInput>,
    tx: Sender<PlayerInput>,
}

impl InputQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        InputQueue { rx, tx }
    }

    pub fn sender(&self) -> InputSender {
        InputSender {
            tx: self.tx.clone(),
        }
    }

    /// Everything received since the last drain, in arrival order.
    pub fn drain(&self) -> Vec<PlayerInput> {
        self.rx.try_iter().collect()
    }
}

impl Default for InputQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_arrival_order() {
        let queue = InputQueue::new();
        let sender = queue.sender();
        assert!(sender.note_on(60, 100));
        assert!(sender.pedal(127));
        assert!(sender.note_off(60));

        assert_eq!(
            queue.drain(),
            vec![
                PlayerInput::Note {
                    number: 60,
                    velocity: 100,
                    is_on: true
                },
                PlayerInput::Pedal { level: 127 },
                PlayerInput::Note {
                    number: 60,
                    velocity: 0,
                    is_on: false
                },
            ]
        );
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn senders_work_across_threads() {
        let queue = InputQueue::new();
        let sender = queue.sender();
        std::thread::spawn(move || {
            for n in 0..10 {
                sender.note_on(n, 1);
            }
        })
        .join()
        .unwrap();
        assert_eq!(queue.drain().len(), 10);
    }

    #[test]
    fn send_fails_after_queue_dropped() {
        let queue = InputQueue::new();
        let sender = queue.sender();
        drop(queue);
        assert!(!sender.pedal(0));
    }
}
