//! The TSCH transmit queue.
//!
//! Priority frames (keep-alives, 6P responses) sit in front of normal ones,
//! in arrival order among themselves.  A priority frame arriving at a full
//! queue evicts the oldest normal frame, unless that frame is the one on the
//! air right now.

use crate::Packet;

#[derive(Debug)]
pub struct TxQueue {
    frames:    Vec<Packet>,
    /// Maximum length; `None` is unbounded.
    capacity:  Option<usize>,
    /// UID of the frame currently being transmitted.
    in_flight: Option<u64>,
}

/// Result of a successful enqueue.
#[derive(Debug, PartialEq)]
pub enum Enqueued {
    Queued,
    /// Queued after evicting this normal frame.
    Evicted(Packet),
}

impl TxQueue {
    /// `capacity = -1` means unbounded.
    pub fn new(capacity: i32) -> Self {
        TxQueue {
            frames:    Vec::new(),
            capacity:  usize::try_from(capacity).ok(),
            in_flight: None,
        }
    }

    fn priority_insert_index(&self) -> usize {
        self.frames.iter().take_while(|p| p.mac.priority).count()
    }

    /// Enqueue `packet`, or hand it back if there is no room.
    pub fn enqueue(&mut self, packet: Packet) -> Result<Enqueued, Packet> {
        let full = self.capacity.is_some_and(|cap| self.frames.len() >= cap);
        if !full {
            if packet.mac.priority {
                let i = self.priority_insert_index();
                self.frames.insert(i, packet);
            } else {
                self.frames.push(packet);
            }
            return Ok(Enqueued::Queued);
        }
        if !packet.mac.priority {
            return Err(packet);
        }
        let in_flight = self.in_flight;
        let Some(victim) = self
            .frames
            .iter()
            .position(|p| !p.mac.priority && Some(p.uid) != in_flight)
        else {
            return Err(packet);
        };
        let evicted = self.frames.remove(victim);
        let i = self.priority_insert_index();
        self.frames.insert(i, packet);
        Ok(Enqueued::Evicted(evicted))
    }

    pub fn remove(&mut self, uid: u64) -> Option<Packet> {
        let i = self.frames.iter().position(|p| p.uid == uid)?;
        if self.in_flight == Some(uid) {
            self.in_flight = None;
        }
        Some(self.frames.remove(i))
    }

    /// Remove every frame matching `pred`, returning them in queue order.
    pub fn remove_where(&mut self, mut pred: impl FnMut(&Packet) -> bool) -> Vec<Packet> {
        let (out, keep): (Vec<Packet>, Vec<Packet>) = self.frames.drain(..).partition(|p| pred(p));
        self.frames = keep;
        out
    }

    pub fn get(&self, uid: u64) -> Option<&Packet> {
        self.frames.iter().find(|p| p.uid == uid)
    }

    pub fn get_mut(&mut self, uid: u64) -> Option<&mut Packet> {
        self.frames.iter_mut().find(|p| p.uid == uid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Packet> {
        self.frames.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Packet> {
        self.frames.iter_mut()
    }

    /// Whether a unicast frame for `dst` is waiting.
    pub fn has_frame_for(&self, dst: ts_core::Eui64) -> bool {
        self.frames.iter().any(|p| p.mac.dst == dst)
    }

    pub fn set_in_flight(&mut self, uid: Option<u64>) {
        self.in_flight = uid;
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) -> Vec<Packet> {
        self.in_flight = None;
        std::mem::take(&mut self.frames)
    }
}
