use super::*;

#[test]
fn end_with_drained_buffer_finalizes_immediately() {
    let (tx, mut pacer) = test_setup();
    let mut t = create_throttle(&tx, &mut pacer, ThrottleOptions::default());
    send_write(&tx, &mut pacer, t.id, &[0u8; 10]);

    pacer.tick(Instant::now());
    assert_eq!(drain(&mut t.chunks), vec![10]);

    send_end(&tx, &mut pacer, t.id);
    assert_eq!(t.done.try_recv().unwrap(), Ok(()));
    let stats = pacer.stats();
    assert_eq!(stats.in_flight, 0);
    assert!(!stats.clock_running);
    assert!(stats.throttles.is_empty());
}

#[test]
fn done_resolves_only_after_last_emission() {
    let (tx, mut pacer) = test_setup();
    let mut t = create_throttle(&tx, &mut pacer, ThrottleOptions::default());
    send_write(&tx, &mut pacer, t.id, &[0u8; 25]);
    send_end(&tx, &mut pacer, t.id);

    let t0 = Instant::now();
    run_ticks(&mut pacer, t0, 2);
    assert!(t.done.try_recv().is_err(), "5 bytes still pending");

    let tick_duration = pacer.config.tick_duration();
    run_ticks(&mut pacer, t0 + tick_duration * 2, 1);
    assert_eq!(drain(&mut t.chunks), vec![10, 10, 5]);
    assert_eq!(t.done.try_recv().unwrap(), Ok(()));
}

#[test]
fn end_of_never_written_throttle_completes_it() {
    let (tx, mut pacer) = test_setup();
    let mut t = create_throttle(&tx, &mut pacer, ThrottleOptions::default());

    send_end(&tx, &mut pacer, t.id);
    assert_eq!(t.done.try_recv().unwrap(), Ok(()));
    assert!(pacer.stats().throttles.is_empty());
}

#[test]
fn abort_discards_buffered_bytes() {
    let (tx, mut pacer) = test_setup();
    let mut t = create_throttle(&tx, &mut pacer, ThrottleOptions::default());
    send_write(&tx, &mut pacer, t.id, &[0u8; 50]);

    tx.send(PacerCommand::Abort { id: t.id }).unwrap();
    pacer.handle_all_pending();

    assert_eq!(t.done.try_recv().unwrap(), Err(ThrottleError::Aborted));
    assert!(drain(&mut t.chunks).is_empty(), "nothing was ever emitted");
    let stats = pacer.stats();
    assert_eq!(stats.in_flight, 0);
    assert!(!stats.clock_running);
}

#[test]
fn graceful_abort_resolves_done_successfully() {
    let (tx, mut pacer) = test_setup();
    let mut t = create_throttle(&tx, &mut pacer, ThrottleOptions::default());
    send_write(&tx, &mut pacer, t.id, &[0u8; 50]);

    tx.send(PacerCommand::GracefulAbort { id: t.id }).unwrap();
    pacer.handle_all_pending();

    assert_eq!(t.done.try_recv().unwrap(), Ok(()));
    assert_eq!(pacer.stats().in_flight, 0);
}

#[test]
fn abort_is_idempotent() {
    let (tx, mut pacer) = test_setup();
    let mut t = create_throttle(&tx, &mut pacer, ThrottleOptions::default());
    send_write(&tx, &mut pacer, t.id, &[0u8; 50]);

    tx.send(PacerCommand::Abort { id: t.id }).unwrap();
    pacer.handle_all_pending();
    let after_first = pacer.stats();

    // A second abort (and a graceful one) find nothing to do
    tx.send(PacerCommand::Abort { id: t.id }).unwrap();
    tx.send(PacerCommand::GracefulAbort { id: t.id }).unwrap();
    pacer.handle_all_pending();

    assert_eq!(pacer.stats(), after_first);
    assert_eq!(t.done.try_recv().unwrap(), Err(ThrottleError::Aborted));
}

#[test]
fn backpressure_receipts_fail_on_hard_abort() {
    let (tx, mut pacer) = test_setup();
    let t = create_throttle(
        &tx,
        &mut pacer,
        ThrottleOptions {
            backpressure: true,
            ..Default::default()
        },
    );
    let mut receipt = send_write(&tx, &mut pacer, t.id, &[0u8; 50]);

    tx.send(PacerCommand::Abort { id: t.id }).unwrap();
    pacer.handle_all_pending();

    assert_eq!(receipt.try_recv().unwrap(), Err(ThrottleError::Aborted));
}

#[test]
fn detached_reader_triggers_graceful_abort_on_next_tick() {
    let (tx, mut pacer) = test_setup();
    let mut t = create_throttle(&tx, &mut pacer, ThrottleOptions::default());
    send_write(&tx, &mut pacer, t.id, &[0u8; 50]);

    drop(t.chunks);
    pacer.tick(Instant::now());

    assert_eq!(t.done.try_recv().unwrap(), Ok(()));
    let stats = pacer.stats();
    assert_eq!(stats.in_flight, 0);
    assert!(!stats.clock_running);
    assert!(stats.throttles.is_empty());
}

#[test]
fn sibling_unaffected_by_detachment() {
    let (tx, mut pacer) = test_setup();
    let mut a = create_throttle(&tx, &mut pacer, ThrottleOptions::default());
    let mut b = create_throttle(&tx, &mut pacer, ThrottleOptions::default());
    send_write(&tx, &mut pacer, a.id, &[0u8; 100]);
    send_write(&tx, &mut pacer, b.id, &[0u8; 100]);

    drop(a.chunks);
    let t0 = Instant::now();
    pacer.tick(t0);

    // a is gone; b got its half-share this tick
    assert_eq!(a.done.try_recv().unwrap(), Ok(()));
    assert_eq!(drain(&mut b.chunks), vec![5]);

    // With a gone, b's quota recomputes to the full budget
    pacer.tick(t0 + pacer.config.tick_duration());
    assert_eq!(drain(&mut b.chunks), vec![10]);
}

#[test]
fn completion_mid_tick_leaves_consistent_state() {
    let (tx, mut pacer) = test_setup();
    let mut a = create_throttle(&tx, &mut pacer, ThrottleOptions::default());
    let mut b = create_throttle(&tx, &mut pacer, ThrottleOptions::default());
    // a finishes on the very first tick; b keeps going
    send_write(&tx, &mut pacer, a.id, &[0u8; 5]);
    send_write(&tx, &mut pacer, b.id, &[0u8; 100]);
    send_end(&tx, &mut pacer, a.id);

    let t0 = Instant::now();
    pacer.tick(t0);

    assert_eq!(drain(&mut a.chunks), vec![5]);
    assert_eq!(a.done.try_recv().unwrap(), Ok(()));
    let stats = pacer.stats();
    assert_eq!(stats.in_flight, 1);
    assert!(stats.clock_running);

    pacer.tick(t0 + pacer.config.tick_duration());
    assert_eq!(drain(&mut b.chunks).len(), 2);
}

#[test]
fn shutdown_destroys_every_throttle() {
    let (tx, mut pacer) = test_setup();
    let mut a = create_throttle(&tx, &mut pacer, ThrottleOptions::default());
    let mut b = create_throttle(&tx, &mut pacer, ThrottleOptions::default());
    send_write(&tx, &mut pacer, a.id, &[0u8; 50]);

    tx.send(PacerCommand::Shutdown).unwrap();
    pacer.run();

    assert_eq!(a.done.try_recv().unwrap(), Err(ThrottleError::Aborted));
    assert_eq!(b.done.try_recv().unwrap(), Err(ThrottleError::Aborted));
    assert!(matches!(
        a.chunks.try_recv(),
        Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
    ));
}

#[test]
fn clock_runs_iff_in_flight_nonempty() {
    let (tx, mut pacer) = test_setup();
    let t = create_throttle(&tx, &mut pacer, ThrottleOptions::default());
    assert!(!pacer.stats().clock_running);

    send_write(&tx, &mut pacer, t.id, &[0u8; 10]);
    assert!(pacer.stats().clock_running);
    assert_eq!(pacer.stats().in_flight, 1);

    send_end(&tx, &mut pacer, t.id);
    pacer.tick(Instant::now());
    let stats = pacer.stats();
    assert_eq!(stats.in_flight, 0);
    assert!(!stats.clock_running);
}
