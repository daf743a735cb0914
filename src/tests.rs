use std::collections::VecDeque;

use crate::{
    records::UserSlot,
    transport::{Command, Response, Transport, FRAME_LEN, PADDING_BYTE, RESPONSE_LEN},
    Bm58, Bm58Error, Measurement, SequenceViolation, SessionState,
};

/// Scripted transport: records every transmitted frame and replays queued
/// responses.
#[derive(Default)]
struct MockTransport {
    frames: Vec<[u8; FRAME_LEN]>,
    responses: VecDeque<[u8; RESPONSE_LEN]>,
    fail_sends: bool,
    closed: usize,
}

impl MockTransport {
    fn with_responses<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = [u8; RESPONSE_LEN]>,
    {
        Self {
            responses: responses.into_iter().collect(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct MockError(&'static str);

impl Transport for MockTransport {
    type SendError = MockError;
    type RecvError = MockError;
    type Error = MockError;

    fn send(&mut self, command: &Command) -> Result<(), MockError> {
        if self.fail_sends {
            return Err(MockError("send failed"));
        }
        self.frames.push(command.to_frame());
        Ok(())
    }

    fn recv(&mut self) -> Result<Response, MockError> {
        self.responses
            .pop_front()
            .map(Response::from)
            .ok_or(MockError("no scripted response"))
    }

    fn close(&mut self) {
        self.closed += 1;
    }
}

fn frame(opcode: u8, params: &[u8]) -> [u8; FRAME_LEN] {
    let mut frame = [PADDING_BYTE; FRAME_LEN];
    frame[0] = opcode;
    frame[1..1 + params.len()].copy_from_slice(params);
    frame
}

/// Five handshake responses whose printable content reads "BM58 0497".
const IDENT_RESPONSES: [[u8; RESPONSE_LEN]; 5] = [
    [0x00, b'B', b'M', 0x01, b'5', b'8', 0x02, 0x00],
    [0x03, b' ', 0x00, b'0', 0xFF, 0x04, 0x05, 0x06],
    [b'4', 0x07, 0x80, 0x09, 0x0A, 0x0B, 0x1F, 0x7F],
    [0x00, b'9', 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
    [0x00, 0x00, b'7', 0x00, 0x00, 0x00, 0x00, 0x00],
];

const RECORD_ONE: [u8; RESPONSE_LEN] = [100, 95, 72, 6, 15, 14, 30, 24];
const RECORD_TWO: [u8; RESPONSE_LEN] = [90, 70, 60, 1, 145, 9, 5, 24];

fn count_response(count: u8) -> [u8; RESPONSE_LEN] {
    [count, 0, 0, 0, 0, 0, 0, 0]
}

fn ready_session(
    extra_responses: &[[u8; RESPONSE_LEN]],
) -> Bm58<MockTransport> {
    let mut responses = IDENT_RESPONSES.to_vec();
    responses.extend_from_slice(extra_responses);

    let mut session = Bm58::new(MockTransport::with_responses(responses));
    session.initialize().unwrap();
    session
}

#[test]
fn handshake_sends_fixed_opcodes_in_order() {
    let mut session = Bm58::new(MockTransport::with_responses(IDENT_RESPONSES));

    let identifier = session.initialize().unwrap();
    assert_eq!(identifier.as_str(), "BM58 0497");
    assert_eq!(session.state(), SessionState::Ready);

    let transport = session.release();
    let expected: Vec<_> = [0xAA, 0xA4, 0xA5, 0xA6, 0xA7]
        .iter()
        .map(|&opcode| frame(opcode, &[]))
        .collect();
    assert_eq!(transport.frames, expected);
}

#[test]
fn record_fetches_use_one_based_ascending_indices() {
    let mut session = ready_session(&[count_response(2), RECORD_ONE, RECORD_TWO]);

    assert_eq!(session.record_count().unwrap(), 2);
    session.get_record(0).unwrap();
    session.get_record(1).unwrap();

    let transport = session.release();
    assert_eq!(transport.frames[5], frame(0xA2, &[]));
    assert_eq!(transport.frames[6], frame(0xA3, &[1]));
    assert_eq!(transport.frames[7], frame(0xA3, &[2]));
}

#[test]
fn reads_back_two_reference_records() {
    let mut session = ready_session(&[count_response(2), RECORD_ONE, RECORD_TWO]);

    let count = session.record_count().unwrap();
    let records: Vec<_> = (0..count)
        .map(|slot| session.get_record(slot).unwrap())
        .collect();

    assert_eq!(
        records,
        vec![
            Measurement {
                year: 2024,
                month: 6,
                day: 15,
                hour: 14,
                minute: 30,
                systolic: 125,
                diastolic: 120,
                pulse: 72,
                user_slot: UserSlot::One,
            },
            Measurement {
                year: 2024,
                month: 1,
                day: 17,
                hour: 9,
                minute: 5,
                systolic: 115,
                diastolic: 95,
                pulse: 60,
                user_slot: UserSlot::Two,
            },
        ]
    );
}

#[test]
fn records_iterator_drains_the_device() {
    let mut session = ready_session(&[count_response(2), RECORD_ONE, RECORD_TWO]);

    let records: Vec<_> = session.records().collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].pulse, 72);
    assert_eq!(records[1].pulse, 60);

    // The iterator issued the count query itself.
    let transport = session.release();
    assert_eq!(transport.frames[5], frame(0xA2, &[]));
}

#[test]
fn operations_require_the_right_state() {
    let mut session = Bm58::new(MockTransport::with_responses(IDENT_RESPONSES));

    assert_eq!(
        session.record_count(),
        Err(Bm58Error::InvalidSequence(SequenceViolation::WrongState {
            operation: "record_count",
            state: SessionState::Initialized,
        }))
    );

    session.initialize().unwrap();
    assert_eq!(
        session.initialize(),
        Err(Bm58Error::InvalidSequence(SequenceViolation::WrongState {
            operation: "initialize",
            state: SessionState::Ready,
        }))
    );
}

#[test]
fn record_count_runs_exactly_once() {
    let mut session = ready_session(&[count_response(1), RECORD_ONE]);

    session.record_count().unwrap();
    assert_eq!(
        session.record_count(),
        Err(Bm58Error::InvalidSequence(
            SequenceViolation::CountAlreadyQueried
        ))
    );
}

#[test]
fn record_fetch_requires_a_prior_count() {
    let mut session = ready_session(&[]);

    assert_eq!(
        session.get_record(0),
        Err(Bm58Error::InvalidSequence(
            SequenceViolation::CountNotQueried
        ))
    );
}

#[test]
fn record_fetches_must_ascend_without_gaps() {
    let mut session = ready_session(&[count_response(2), RECORD_ONE, RECORD_TWO]);
    session.record_count().unwrap();

    assert_eq!(
        session.get_record(1),
        Err(Bm58Error::InvalidSequence(SequenceViolation::OutOfOrder {
            expected: 0,
            requested: 1,
        }))
    );

    session.get_record(0).unwrap();

    // Re-fetching an already-advanced slot is equally invalid.
    assert_eq!(
        session.get_record(0),
        Err(Bm58Error::InvalidSequence(SequenceViolation::OutOfOrder {
            expected: 1,
            requested: 0,
        }))
    );

    session.get_record(1).unwrap();

    assert_eq!(
        session.get_record(2),
        Err(Bm58Error::InvalidSequence(SequenceViolation::PastEnd {
            count: 2,
            requested: 2,
        }))
    );
}

#[test]
fn terminate_is_idempotent() {
    let mut session = ready_session(&[]);

    session.terminate();
    assert_eq!(session.state(), SessionState::Terminated);

    session.terminate();
    assert_eq!(session.state(), SessionState::Terminated);

    let transport = session.release();

    // The first call sent exactly the two termination opcodes; the second
    // sent nothing and did not close again.
    assert_eq!(transport.frames.len(), 7);
    assert_eq!(transport.frames[5], frame(0xF7, &[]));
    assert_eq!(transport.frames[6], frame(0xF6, &[]));
    assert_eq!(transport.closed, 1);
}

#[test]
fn transport_failure_is_absorbing() {
    // No scripted responses at all: the first handshake read fails.
    let mut session = Bm58::new(MockTransport::default());

    assert_eq!(
        session.initialize(),
        Err(Bm58Error::Transport(MockError("no scripted response")))
    );
    assert_eq!(session.state(), SessionState::Failed);

    assert_eq!(
        session.record_count(),
        Err(Bm58Error::InvalidSequence(SequenceViolation::WrongState {
            operation: "record_count",
            state: SessionState::Failed,
        }))
    );

    // Termination from Failed releases the handle without touching the wire.
    session.terminate();
    assert_eq!(session.state(), SessionState::Terminated);

    let transport = session.release();
    assert_eq!(transport.frames.len(), 1);
    assert_eq!(transport.frames[0], frame(0xAA, &[]));
    assert_eq!(transport.closed, 1);
}

#[test]
fn failed_sends_surface_as_transport_errors() {
    let mut session = Bm58::new(MockTransport {
        fail_sends: true,
        ..MockTransport::default()
    });

    assert_eq!(
        session.initialize(),
        Err(Bm58Error::Transport(MockError("send failed")))
    );
    assert_eq!(session.state(), SessionState::Failed);
}
