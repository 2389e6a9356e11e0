//! End-to-end routing scenarios over a buffer-backed host.

mod common;

use common::TestHost;
use ostinato_router::{input_id, output_id, ChannelClass, OutputFlags, Router, RouterConfig};

fn router_with_host(connected: &[usize]) -> (Router, ostinato_router::RouterHandles, TestHost) {
    let (mut router, handles) = Router::new(RouterConfig::default());
    let mut host = TestHost::new();
    for &out in connected {
        host.connect(out);
    }
    router.refresh_connections(&host);
    (router, handles, host)
}

/// One device event fans out to a plain output untouched and to the active
/// chain with channel translation; the UI sees one snapshot.
#[test]
fn fan_out_with_channel_translation() {
    let (mut router, handles, mut host) =
        router_with_host(&[output_id::CHAIN0, output_id::CHAIN0 + 1]);

    router.set_primary_channel(output_id::CHAIN0, 0).unwrap();
    router
        .set_output_flag(output_id::CHAIN0, OutputFlags::CHAN_TRANSFILTER, false)
        .unwrap();
    router.set_primary_channel(output_id::CHAIN0 + 1, 5).unwrap();
    router.set_active_chain(Some(1)).unwrap();

    host.feed(input_id::DEV0, 0, &[0x90, 60, 100]);
    router.process(64, &mut host);

    assert_eq!(host.written(output_id::CHAIN0), &[(0, vec![0x90, 60, 100])]);
    assert_eq!(
        host.written(output_id::CHAIN0 + 1),
        &[(0, vec![0x95, 60, 100])]
    );

    let snap = handles.ui_events.pop().expect("snapshot");
    assert_eq!(snap.word(), (0x90 << 16) | (60 << 8) | 100);
    assert_eq!(handles.ui_events.pop(), None);
}

/// Master-channel traffic reaches the UI and nothing else.
#[test]
fn master_channel_capture() {
    let (mut router, handles, mut host) = router_with_host(&[output_id::CHAIN0, output_id::MOD]);
    router.set_channel_all(output_id::CHAIN0).unwrap();
    router.set_master_channel(Some(9)).unwrap();

    host.feed(input_id::DEV0, 0, &[0xB9, 7, 42]);
    router.process(64, &mut host);

    assert!(host.written(output_id::CHAIN0).is_empty());
    assert!(host.written(output_id::MOD).is_empty());

    let snap = handles.ui_events.pop().expect("snapshot");
    assert_eq!(snap.word(), (0xB9 << 16) | (7 << 8) | 42);
}

/// A filter-table remap rewrites class, channel and number before fan-out.
#[test]
fn filter_table_remap() {
    let (mut router, _handles, mut host) = router_with_host(&[output_id::CHAIN0]);
    router.set_channel_all(output_id::CHAIN0).unwrap();
    router
        .set_output_flag(output_id::CHAIN0, OutputFlags::DROP_CC, false)
        .unwrap();
    router.filter_mut().set_cc_map(0, 7, 2, 11).unwrap();

    host.feed(input_id::DEV0, 0, &[0xB0, 7, 42]);
    router.process(64, &mut host);

    assert_eq!(host.written(output_id::CHAIN0), &[(0, vec![0xB2, 11, 42])]);
}

/// The relative-mode auto-detector: two marks confirm, offsets are applied
/// to the running value, a late mark after two offsets reverts to absolute.
#[test]
fn relative_cc_auto_detection() {
    let (mut router, _handles, mut host) = router_with_host(&[output_id::CHAIN0]);
    router.set_channel_all(output_id::CHAIN0).unwrap();
    router
        .set_output_flag(output_id::CHAIN0, OutputFlags::DROP_CC, false)
        .unwrap();

    // Seed the last-seen value.
    host.feed(input_id::DEV0, 0, &[0xB0, 21, 30]);
    router.process(64, &mut host);
    host.clear_inputs();
    assert_eq!(
        router.input(input_id::DEV0).unwrap().last_ctrl_value(0, 21),
        30
    );

    host.feed(input_id::DEV0, 0, &[0xB0, 21, 64]);
    host.feed(input_id::DEV0, 1, &[0xB0, 21, 64]);
    host.feed(input_id::DEV0, 2, &[0xB0, 21, 65]);
    host.feed(input_id::DEV0, 3, &[0xB0, 21, 63]);
    host.feed(input_id::DEV0, 4, &[0xB0, 21, 64]);
    router.process(64, &mut host);

    let written = host.written(output_id::CHAIN0);
    assert_eq!(
        written,
        &[
            (2, vec![0xB0, 21, 31]),
            (3, vec![0xB0, 21, 30]),
            (4, vec![0xB0, 21, 64]),
        ]
    );
}

/// With tuning active, a pitch-bend rides immediately ahead of the note-on
/// at the same timestamp.
#[test]
fn tuning_pitchbend_injection() {
    let (mut router, _handles, mut host) = router_with_host(&[output_id::CHAIN0]);
    router.set_channel_all(output_id::CHAIN0).unwrap();

    // Offset 0x2200: an eighth of a tone sharp of concert pitch.
    let freq = 440.0 * f64::powf(2.0, 0.0625 / 6.0);
    router.set_tuning_freq(freq).unwrap();
    assert_eq!(router.tuning_pitchbend(), Some(0x2200));

    host.feed(input_id::DEV0, 7, &[0x90, 64, 100]);
    router.process(64, &mut host);

    assert_eq!(
        host.written(output_id::CHAIN0),
        &[(7, vec![0xE0, 0x00, 0x44]), (7, vec![0x90, 64, 100])]
    );
}

/// Incoming pitch-bend is remembered raw, emitted tuned, and the next
/// note-on's injected bend builds on the remembered raw value.
#[test]
fn tuning_tracks_incoming_pitchbend() {
    let (mut router, _handles, mut host) = router_with_host(&[output_id::CHAIN0]);
    router.set_channel_all(output_id::CHAIN0).unwrap();
    let freq = 440.0 * f64::powf(2.0, 0.0625 / 6.0);
    router.set_tuning_freq(freq).unwrap();

    // Bend down to 0x1000: emitted as 0x1000 + 0x200.
    host.feed(input_id::DEV0, 0, &[0xE0, 0x00, 0x20]);
    host.feed(input_id::DEV0, 1, &[0x90, 64, 100]);
    router.process(64, &mut host);

    let written = host.written(output_id::CHAIN0);
    assert_eq!(written[0], (0, vec![0xE0, 0x00, 0x24]));
    // The injected bend ahead of the note uses the raw remembered value.
    assert_eq!(written[1], (1, vec![0xE0, 0x00, 0x24]));
    assert_eq!(written[2], (1, vec![0x90, 64, 100]));

    assert_eq!(router.output(output_id::CHAIN0).unwrap().last_pb(0), 0x1000);
}

/// Note range rejects out-of-window notes; transpose shifts the survivors.
#[test]
fn note_range_and_transpose() {
    let (mut router, _handles, mut host) = router_with_host(&[output_id::CHAIN0]);
    router.set_channel_all(output_id::CHAIN0).unwrap();
    router.set_note_range(output_id::CHAIN0, 60, 72, 1, 0).unwrap();

    host.feed(input_id::DEV0, 0, &[0x90, 60, 100]);
    host.feed(input_id::DEV0, 1, &[0x90, 72, 100]);
    host.feed(input_id::DEV0, 2, &[0x90, 80, 100]);
    router.process(64, &mut host);

    assert_eq!(
        host.written(output_id::CHAIN0),
        &[(0, vec![0x90, 72, 100]), (1, vec![0x90, 84, 100])]
    );
}

/// A note-off for a note that sounded on a previously active chain is
/// redirected there, releasing the hanging note.
#[test]
fn hanging_note_recovery() {
    let chain_a = output_id::CHAIN0;
    let chain_b = output_id::CHAIN0 + 1;
    let (mut router, _handles, mut host) = router_with_host(&[chain_a, chain_b]);
    router.set_primary_channel(chain_a, 0).unwrap();
    router.set_primary_channel(chain_b, 1).unwrap();

    router.set_active_chain(Some(0)).unwrap();
    host.feed(input_id::DEV0, 0, &[0x90, 60, 100]);
    router.process(64, &mut host);
    assert_eq!(router.output(chain_a).unwrap().note_state(60), 100);
    assert_eq!(router.output(chain_b).unwrap().note_state(60), 0);

    host.clear_inputs();
    router.set_active_chain(Some(1)).unwrap();
    host.feed(input_id::DEV0, 0, &[0x80, 60, 0]);
    router.process(64, &mut host);

    // The release lands on chain A, on A's channel; B stays silent.
    assert_eq!(host.written(chain_a), &[(0, vec![0x80, 60, 0])]);
    assert!(host.written(chain_b).is_empty());
    assert_eq!(router.output(chain_a).unwrap().note_state(60), 0);
}

/// Chain drop policies: external CC and system events die, UI-sourced
/// program changes survive.
#[test]
fn chain_drop_policies() {
    let (mut router, mut handles, mut host) = router_with_host(&[output_id::CHAIN0]);
    router.set_primary_channel(output_id::CHAIN0, 0).unwrap();
    router.set_active_chain(Some(0)).unwrap();

    host.feed(input_id::DEV0, 0, &[0xB0, 7, 42]); // CC: dropped by DROP_CC
    host.feed(input_id::DEV0, 1, &[0xF8, 0, 0]); // clock: dropped by DROP_SYS
    host.feed(input_id::DEV0, 2, &[0x90, 60, 100]); // note passes
    handles.ui_in.send_program_change(0, 12).unwrap(); // UI bypasses DROP_PC
    router
        .set_output_flag(output_id::CHAIN0, OutputFlags::DROP_PC, true)
        .unwrap();
    router.process(64, &mut host);

    let written = host.written(output_id::CHAIN0);
    assert_eq!(written[0], (0, vec![0xC0, 12, 0]));
    assert_eq!(written[1], (2, vec![0x90, 60, 100]));
    assert_eq!(written.len(), 2);
}

/// Direct outputs bypass routing: ring events land in the host buffer during
/// the drain, and an unconnected port swallows them.
#[test]
fn direct_output_drain() {
    let (mut router, mut handles, mut host) = router_with_host(&[output_id::CTRL_FB]);

    handles.ctrl_feedback_out.send_control_change(0, 7, 99).unwrap();
    handles.device_out[0].send_note_on(0, 60, 100).unwrap();
    router.process(64, &mut host);

    assert_eq!(
        host.written(output_id::CTRL_FB),
        &[(0, vec![0xB0, 7, 99])]
    );
    // Device echo 0 is unconnected: drained but not delivered.
    assert!(host.written(output_id::DEV0).is_empty());

    // Next period: the ring does not replay.
    router.process(64, &mut host);
    assert!(host.written(output_id::CTRL_FB).is_empty());
}

/// Synthetic inputs sort ahead of host events and merge by input order.
#[test]
fn synthetic_events_merge_first() {
    let (mut router, mut handles, mut host) = router_with_host(&[output_id::CHAIN0]);
    router.set_channel_all(output_id::CHAIN0).unwrap();

    host.feed(input_id::DEV0, 1, &[0x90, 62, 100]);
    handles.internal_in.send_note_on(0, 60, 100).unwrap();
    router.process(64, &mut host);

    let written = host.written(output_id::CHAIN0);
    assert_eq!(written[0].1, vec![0x90, 60, 100]);
    assert_eq!(written[1].1, vec![0x90, 62, 100]);
}

/// Disabling system events drops everything from SysEx up; Active Sense
/// never propagates at all.
#[test]
fn system_event_gating() {
    let (mut router, _handles, mut host) = router_with_host(&[output_id::STEP]);
    router
        .set_output_flag(output_id::STEP, OutputFlags::DROP_SYS, false)
        .unwrap();

    host.feed(input_id::DEV0, 0, &[0xFE, 0, 0]);
    host.feed(input_id::DEV0, 1, &[0xF8, 0, 0]);
    router.process(64, &mut host);
    assert_eq!(host.written(output_id::STEP), &[(1, vec![0xF8, 0, 0])]);

    host.clear_inputs();
    router.set_system_events(false);
    host.feed(input_id::DEV0, 0, &[0xF8, 0, 0]);
    router.process(64, &mut host);
    assert!(host.written(output_id::STEP).is_empty());
}

/// SysEx passes whole to outputs without DROP_SYSEX and is dropped by the
/// step output, which carries that policy.
#[test]
fn sysex_policy() {
    let (mut router, _handles, mut host) = router_with_host(&[output_id::MOD, output_id::STEP]);
    router
        .set_output_flag(output_id::MOD, OutputFlags::DROP_SYS, false)
        .unwrap();

    host.feed(input_id::DEV0, 0, &[0xF0, 0x7E, 0x01, 0xF7]);
    router.process(64, &mut host);

    assert_eq!(
        host.written(output_id::MOD),
        &[(0, vec![0xF0, 0x7E, 0x01, 0xF7])]
    );
    assert!(host.written(output_id::STEP).is_empty());
}

/// A remap can move traffic onto the master channel; the compare happens
/// after mapping.
#[test]
fn remap_onto_master_channel_is_captured() {
    let (mut router, handles, mut host) = router_with_host(&[output_id::CHAIN0]);
    router.set_channel_all(output_id::CHAIN0).unwrap();
    router
        .set_output_flag(output_id::CHAIN0, OutputFlags::DROP_CC, false)
        .unwrap();
    router.set_master_channel(Some(9)).unwrap();
    router
        .filter_mut()
        .set_map(
            (ChannelClass::ControlChange, 0, 7),
            (ChannelClass::ControlChange, 9, 7),
        )
        .unwrap();

    host.feed(input_id::DEV0, 0, &[0xB0, 7, 1]);
    router.process(64, &mut host);

    assert!(host.written(output_id::CHAIN0).is_empty());
    let snap = handles.ui_events.pop().expect("snapshot");
    assert_eq!(snap.status(), 0xB9);
}

/// The CC swap layer is off by default and exchanges controllers when the
/// input opts in.
#[test]
fn cc_swap_layer() {
    let (mut router, _handles, mut host) = router_with_host(&[output_id::CHAIN0]);
    router.set_channel_all(output_id::CHAIN0).unwrap();
    router
        .set_output_flag(output_id::CHAIN0, OutputFlags::DROP_CC, false)
        .unwrap();
    router.swap_mut().set(0, 10, 0, 20).unwrap();

    // Flag off: no exchange.
    host.feed(input_id::DEV0, 0, &[0xB0, 10, 5]);
    router.process(64, &mut host);
    assert_eq!(host.written(output_id::CHAIN0), &[(0, vec![0xB0, 10, 5])]);

    // Flag on: 10 -> 20 and the return arrow 20 -> 10.
    router.set_cc_swap(input_id::DEV0, true).unwrap();
    host.clear_inputs();
    host.feed(input_id::DEV0, 0, &[0xB0, 10, 5]);
    host.feed(input_id::DEV0, 1, &[0xB0, 20, 6]);
    router.process(64, &mut host);
    assert_eq!(
        host.written(output_id::CHAIN0),
        &[(0, vec![0xB0, 20, 5]), (1, vec![0xB0, 10, 6])]
    );
}

/// Remap targets with 2-byte wire forms truncate the event; pitch-bend
/// targets carry the value in the second data byte.
#[test]
fn filter_remap_rewrites_wire_forms() {
    let (mut router, _handles, mut host) = router_with_host(&[output_id::CHAIN0]);
    router.set_channel_all(output_id::CHAIN0).unwrap();
    router
        .set_output_flags(output_id::CHAIN0, OutputFlags::empty())
        .unwrap();
    router
        .filter_mut()
        .set_map(
            (ChannelClass::ControlChange, 0, 7),
            (ChannelClass::ProgramChange, 1, 5),
        )
        .unwrap();
    router
        .filter_mut()
        .set_map(
            (ChannelClass::ControlChange, 0, 8),
            (ChannelClass::PitchBend, 0, 0),
        )
        .unwrap();

    host.feed(input_id::DEV0, 0, &[0xB0, 7, 42]);
    host.feed(input_id::DEV0, 1, &[0xB0, 8, 66]);
    router.process(64, &mut host);

    assert_eq!(
        host.written(output_id::CHAIN0),
        &[(0, vec![0xC1, 5]), (1, vec![0xE0, 0x00, 66])]
    );
}

/// A panic releases everything a chain still has sounding, at the start of
/// the next period.
#[test]
fn all_notes_off_releases_sounding_notes() {
    let (mut router, _handles, mut host) = router_with_host(&[output_id::CHAIN0]);
    router.set_primary_channel(output_id::CHAIN0, 2).unwrap();
    router.set_active_chain(Some(0)).unwrap();

    host.feed(input_id::DEV0, 0, &[0x90, 60, 100]);
    host.feed(input_id::DEV0, 1, &[0x90, 64, 90]);
    router.process(64, &mut host);
    host.clear_inputs();

    router.all_notes_off_chain(0).unwrap();
    router.process(64, &mut host);

    assert_eq!(
        host.written(output_id::CHAIN0),
        &[(0, vec![0x82, 60, 0]), (0, vec![0x82, 64, 0])]
    );
    assert_eq!(router.output(output_id::CHAIN0).unwrap().note_state(60), 0);
    assert_eq!(router.output(output_id::CHAIN0).unwrap().note_state(64), 0);

    // Nothing further pending: the next period is silent.
    router.process(64, &mut host);
    assert!(host.written(output_id::CHAIN0).is_empty());
}

/// During MIDI learn the control-feedback input is not read.
#[test]
fn learning_mode_mutes_control_feedback() {
    let (mut router, handles, mut host) = router_with_host(&[output_id::CHAIN0]);
    router.set_channel_all(output_id::CHAIN0).unwrap();

    router.set_learning_mode(true);
    host.feed(input_id::CTRL_FB, 0, &[0xB0, 7, 42]);
    router.process(64, &mut host);
    assert_eq!(handles.ui_events.pop(), None);

    router.set_learning_mode(false);
    router.process(64, &mut host);
    let snap = handles.ui_events.pop().expect("snapshot after learn ends");
    assert_eq!(snap.source(), input_id::CTRL_FB as u8);
}
