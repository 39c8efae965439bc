//! Unit tests for the event queue and the engine loop.

#[cfg(test)]
mod helpers {
    use ts_core::Asn;

    use crate::{Engine, EngineError, IntraSlotOrder};

    /// Run to completion, recording each fired tag with its ASN.
    pub fn run_recording(engine: &mut Engine<&'static str>) -> Vec<(u64, &'static str)> {
        let mut fired = Vec::new();
        engine
            .run(|_q, asn, tag| {
                fired.push((asn.0, tag));
                Ok::<_, EngineError>(())
            })
            .unwrap();
        fired
    }

    pub fn at(engine: &mut Engine<&'static str>, asn: u64, order: IntraSlotOrder, tag: &'static str) {
        engine.schedule_at(Asn(asn), order, tag);
    }
}

#[cfg(test)]
mod ordering {
    use ts_core::Asn;

    use super::helpers::*;
    use crate::{Engine, IntraSlotOrder};

    #[test]
    fn same_asn_and_order_is_fifo() {
        let mut e = Engine::new(Asn(10));
        at(&mut e, 1, IntraSlotOrder::StackTasks, "cb1");
        at(&mut e, 1, IntraSlotOrder::StackTasks, "cb2");
        at(&mut e, 1, IntraSlotOrder::StackTasks, "cb3");
        let fired: Vec<_> = run_recording(&mut e).into_iter().map(|(_, t)| t).collect();
        assert_eq!(fired, vec!["cb1", "cb2", "cb3"]);
    }

    #[test]
    fn orders_then_asn() {
        let mut e = Engine::new(Asn(10));
        // Inserted out of order on purpose.
        at(&mut e, 2, IntraSlotOrder::StartSlot, "2.0");
        at(&mut e, 1, IntraSlotOrder::StackTasks, "1.2");
        at(&mut e, 1, IntraSlotOrder::Propagate, "1.1");
        let fired: Vec<_> = run_recording(&mut e).into_iter().map(|(_, t)| t).collect();
        assert_eq!(fired, vec!["1.1", "1.2", "2.0"]);
    }

    #[test]
    fn handler_scheduled_same_slot_event_fires_in_slot() {
        let mut e: Engine<&'static str> = Engine::new(Asn(10));
        e.schedule_at(Asn(3), IntraSlotOrder::Propagate, "first");
        let mut fired = Vec::new();
        e.run(|q, asn, tag| {
            fired.push((asn.0, tag));
            if tag == "first" {
                q.schedule_at(asn, IntraSlotOrder::AdminTasks, "then");
            }
            Ok::<_, crate::EngineError>(())
        })
        .unwrap();
        assert_eq!(fired, vec![(3, "first"), (3, "then")]);
    }
}

#[cfg(test)]
mod tags {
    use ts_core::Asn;

    use super::helpers::*;
    use crate::{Engine, EventQueue, IntraSlotOrder};

    #[test]
    fn rescheduling_replaces() {
        let mut q: EventQueue<u32> = EventQueue::new();
        q.schedule_at(Asn(5), IntraSlotOrder::StackTasks, 7);
        q.schedule_at(Asn(9), IntraSlotOrder::StackTasks, 7);
        assert_eq!(q.len(), 1);
        assert_eq!(q.scheduled_asn(&7), Some(Asn(9)));
    }

    #[test]
    fn cancel_removes() {
        let mut q: EventQueue<u32> = EventQueue::new();
        q.schedule_at(Asn(5), IntraSlotOrder::StackTasks, 1);
        q.schedule_at(Asn(6), IntraSlotOrder::StackTasks, 2);
        assert!(q.cancel(&1));
        assert!(!q.cancel(&1));
        assert!(!q.is_scheduled(&1));
        assert_eq!(q.pop_next().map(|(a, _, t)| (a, t)), Some((Asn(6), 2)));
        assert!(q.is_empty());
    }

    #[test]
    fn cancel_where_filters() {
        let mut q: EventQueue<u32> = EventQueue::new();
        for t in 0..10 {
            q.schedule_at(Asn(t as u64), IntraSlotOrder::StackTasks, t);
        }
        q.cancel_where(|t| t % 2 == 0);
        assert_eq!(q.len(), 5);
        assert!(q.is_scheduled(&3));
        assert!(!q.is_scheduled(&4));
    }

    #[test]
    fn past_events_are_clamped_to_now() {
        let mut q: EventQueue<u32> = EventQueue::new();
        q.schedule_at(Asn(10), IntraSlotOrder::StackTasks, 1);
        q.pop_next();
        q.schedule_at(Asn(3), IntraSlotOrder::StackTasks, 2);
        assert_eq!(q.scheduled_asn(&2), Some(Asn(10)));
    }

    #[test]
    fn engine_fires_replacement_only() {
        let mut e = Engine::new(Asn(20));
        at(&mut e, 4, IntraSlotOrder::StackTasks, "t");
        at(&mut e, 8, IntraSlotOrder::StackTasks, "t");
        assert_eq!(run_recording(&mut e), vec![(8, "t")]);
    }
}

#[cfg(test)]
mod lifecycle {
    use ts_core::Asn;

    use super::helpers::*;
    use crate::{Engine, EngineError, EngineState, IntraSlotOrder, RunOutcome};

    #[test]
    fn finishes_at_terminal_asn() {
        let mut e = Engine::new(Asn(100));
        at(&mut e, 5, IntraSlotOrder::StackTasks, "a");
        at(&mut e, 100, IntraSlotOrder::StackTasks, "too-late");
        let fired = run_recording(&mut e);
        assert_eq!(fired, vec![(5, "a")]);
        assert_eq!(e.current_asn(), Asn(100));
        assert_eq!(e.state(), EngineState::Finished);
    }

    #[test]
    fn pause_and_play() {
        let mut e = Engine::new(Asn(100));
        at(&mut e, 5, IntraSlotOrder::StackTasks, "a");
        at(&mut e, 50, IntraSlotOrder::StackTasks, "b");
        e.pause_at(Asn(20)).unwrap();

        let mut fired = Vec::new();
        let out = e
            .run(|_q, _asn, tag| {
                fired.push(tag);
                Ok::<_, EngineError>(())
            })
            .unwrap();
        assert_eq!(out, RunOutcome::Paused(Asn(20)));
        assert_eq!(fired, vec!["a"]);
        assert_eq!(e.current_asn(), Asn(20));

        e.play();
        let out = e
            .run(|_q, _asn, tag| {
                fired.push(tag);
                Ok::<_, EngineError>(())
            })
            .unwrap();
        assert_eq!(out, RunOutcome::Finished);
        assert_eq!(fired, vec!["a", "b"]);
    }

    #[test]
    fn pause_in_the_past_rejected() {
        let mut e: Engine<&'static str> = Engine::new(Asn(100));
        at(&mut e, 30, IntraSlotOrder::StackTasks, "a");
        e.pause_at(Asn(40)).unwrap();
        e.run(|_q, _a, _t| Ok::<_, EngineError>(())).unwrap();
        assert!(matches!(e.pause_at(Asn(10)), Err(EngineError::PauseInThePast { .. })));
    }

    #[test]
    fn control_handle_abort() {
        let mut e = Engine::new(Asn(100));
        for asn in 0..10 {
            e.schedule_at(Asn(asn), IntraSlotOrder::StackTasks, asn);
        }
        let handle = e.control();
        let mut fired = Vec::new();
        let out = e
            .run(|_q, asn, tag| {
                fired.push(tag);
                if asn == Asn(3) {
                    handle.abort();
                }
                Ok::<_, EngineError>(())
            })
            .unwrap();
        assert_eq!(out, RunOutcome::Aborted);
        assert_eq!(fired, vec![0, 1, 2, 3]);
        assert_eq!(e.state(), EngineState::Aborted);
        assert!(e.run(|_q, _a, _t| Ok::<_, EngineError>(())).is_err());
    }

    #[test]
    fn control_handle_pause_between_slots() {
        let mut e = Engine::new(Asn(100));
        e.schedule_at(Asn(1), IntraSlotOrder::StackTasks, 1u32);
        e.schedule_at(Asn(1), IntraSlotOrder::AdminTasks, 2u32);
        e.schedule_at(Asn(2), IntraSlotOrder::StackTasks, 3u32);
        let handle = e.control();
        let mut fired = Vec::new();
        let out = e
            .run(|_q, _asn, tag| {
                fired.push(tag);
                handle.pause();
                Ok::<_, EngineError>(())
            })
            .unwrap();
        // The pause is honoured only once slot 1 is complete.
        assert_eq!(out, RunOutcome::Paused(Asn(1)));
        assert_eq!(fired, vec![1, 2]);
    }

    #[derive(Debug)]
    enum Boom {
        Engine,
        Handler,
    }

    impl From<EngineError> for Boom {
        fn from(_: EngineError) -> Self {
            Boom::Engine
        }
    }

    #[test]
    fn handler_error_fails_run() {
        let mut e = Engine::new(Asn(100));
        at(&mut e, 2, IntraSlotOrder::StackTasks, "bad");
        at(&mut e, 3, IntraSlotOrder::StackTasks, "never");
        let res = e.run(|_q, _asn, tag| if tag == "bad" { Err(Boom::Handler) } else { Ok(()) });
        assert!(matches!(res, Err(Boom::Handler)));
        assert_eq!(e.state(), EngineState::Failed);
        assert!(e.current_asn() < e.end_asn());
        assert!(matches!(e.run(|_q, _a, _t| Ok::<_, Boom>(())), Err(Boom::Engine)));
    }
}
