use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tandem_bridge::{
    Bridge, BridgeConfig, BridgeEnv, BridgeError, FrameHost, FrameScheduler, HookSet, NoProgress,
    ProgressFn,
};

fn offline(fps: f64) -> Bridge {
    Bridge::offline(BridgeConfig::with_fps(fps))
}

#[test]
fn one_step_advances_exactly_one_frame_duration() {
    for fps in [1.0, 24.0, 30.0, 60.0, 144.0] {
        let bridge = offline(60.0);
        bridge.set_frame_rate(fps);
        let info = bridge.step(1);
        assert_eq!(info.frame, 1);
        assert_eq!(info.time_ms, 1000.0 / fps);
        assert_eq!(info.delta_ms, 1000.0 / fps);
    }
}

#[test]
fn malformed_frame_rates_clamp_to_one() {
    let bridge = offline(60.0);
    for bad in [0.0, -5.0, f64::NAN, f64::INFINITY] {
        assert_eq!(bridge.set_frame_rate(bad), 1.0);
        assert_eq!(bridge.fps(), 1.0);
    }
    bridge.step(1);
    assert_eq!(bridge.time(), 1000.0);
}

#[test]
fn repeated_single_steps_do_not_drift() {
    let bridge = offline(60.0);
    for _ in 0..6000 {
        bridge.step(1);
    }
    assert_eq!(bridge.frame(), 6000);
    assert_eq!(bridge.time(), 6000.0 * (1000.0 / 60.0));
}

#[test]
fn frame_rate_change_does_not_rescale_history() {
    let bridge = offline(10.0);
    bridge.step(5);
    assert_eq!(bridge.time(), 500.0);
    bridge.set_frame_rate(100.0);
    bridge.step(10);
    assert_eq!(bridge.frame(), 15);
    assert!((bridge.time() - 600.0).abs() < 1e-9);
}

#[test]
fn hooks_and_callbacks_run_in_pipeline_order() {
    let bridge = offline(60.0);
    let log = Rc::new(RefCell::new(Vec::<&'static str>::new()));

    let l = log.clone();
    bridge.on_after_update(move |_| {
        l.borrow_mut().push("post");
        Ok(())
    });
    let l = log.clone();
    bridge.on_update(move |_| {
        l.borrow_mut().push("frame");
        Ok(())
    });
    let l = log.clone();
    bridge.on_before_update(move |_| {
        l.borrow_mut().push("pre");
        Ok(())
    });
    let l = log.clone();
    bridge.host().request_animation_frame(move |_| {
        l.borrow_mut().push("callback");
        Ok(())
    });

    bridge.step(1);
    assert_eq!(*log.borrow(), vec!["pre", "callback", "frame", "post"]);
}

#[test]
fn hooks_receive_delta_and_time() {
    let bridge = offline(50.0);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = seen.clone();
    bridge.on_update(move |info| {
        s.borrow_mut().push((info.delta_ms, info.time_ms));
        Ok(())
    });
    bridge.step(2);
    assert_eq!(*seen.borrow(), vec![(20.0, 20.0), (20.0, 40.0)]);
}

#[test]
fn callback_scheduled_during_frame_runs_next_frame() {
    let bridge = offline(60.0);
    let frames = Rc::new(RefCell::new(Vec::new()));

    let host = bridge.host().clone();
    let (f, b) = (frames.clone(), bridge.clone());
    host.request_animation_frame(move |_| {
        f.borrow_mut().push(("outer", b.frame()));
        let (f2, b2) = (f.clone(), b.clone());
        b.host().request_animation_frame(move |_| {
            f2.borrow_mut().push(("inner", b2.frame()));
            Ok(())
        });
        Ok(())
    });

    bridge.step(1);
    assert_eq!(*frames.borrow(), vec![("outer", 1)]);
    assert_eq!(bridge.pending_callbacks(), 1);
    bridge.step(1);
    assert_eq!(*frames.borrow(), vec![("outer", 1), ("inner", 2)]);
}

#[test]
fn cancelled_callback_never_runs_and_late_cancel_is_noop() {
    let bridge = offline(60.0);
    let fired = Rc::new(Cell::new(0));

    let f = fired.clone();
    let cancelled = bridge.host().request_animation_frame(move |_| {
        f.set(f.get() + 100);
        Ok(())
    });
    let f = fired.clone();
    let consumed = bridge.host().request_animation_frame(move |_| {
        f.set(f.get() + 1);
        Ok(())
    });
    bridge.host().cancel_animation_frame(cancelled);
    bridge.step(1);
    assert_eq!(fired.get(), 1);

    bridge.host().cancel_animation_frame(consumed);
    assert!(!bridge.cancel_frame(consumed));
    bridge.step(1);
    assert_eq!(fired.get(), 1);
}

#[test]
fn failing_subscribers_do_not_abort_the_frame() {
    let bridge = offline(60.0);
    let ran = Rc::new(RefCell::new(Vec::new()));

    bridge.on_before_update(|_| anyhow::bail!("pre hook broke"));
    bridge.request_frame(|_| anyhow::bail!("callback broke"));
    let r = ran.clone();
    bridge.request_frame(move |_| {
        r.borrow_mut().push("callback");
        Ok(())
    });
    let r = ran.clone();
    bridge.on_update(move |_| {
        r.borrow_mut().push("frame");
        Ok(())
    });
    let r = ran.clone();
    bridge.on_after_update(move |_| {
        r.borrow_mut().push("post");
        Ok(())
    });

    let info = bridge.step(1);
    assert_eq!(info.frame, 1);
    assert_eq!(*ran.borrow(), vec!["callback", "frame", "post"]);
}

#[test]
fn subscribe_by_name_accepts_known_sets_and_rejects_others() {
    let bridge = offline(60.0);
    let handle = bridge
        .subscribe_by_name("onBeforeUpdate", |_| Ok(()))
        .expect("known set");
    assert_eq!(handle.set(), HookSet::BeforeUpdate);
    assert_eq!(bridge.subscriber_count(HookSet::BeforeUpdate), 1);

    let err = bridge
        .subscribe_by_name("onRender", |_| Ok(()))
        .expect_err("unknown set must fail");
    assert!(matches!(err, BridgeError::UnknownHookSet(name) if name == "onRender"));

    assert!(bridge.unsubscribe(handle));
    assert!(!bridge.unsubscribe(handle));
}

#[test]
fn destroy_restores_exact_native_scheduler() {
    let (host, native) = FrameHost::with_native_queue();
    let native: Rc<dyn FrameScheduler> = native;
    let bridge = Bridge::new(
        BridgeConfig::default(),
        BridgeEnv::offline_with_host(host.clone()),
    );
    assert!(!host.is_current(&native));

    bridge.on_update(|_| Ok(()));
    bridge.request_frame(|_| Ok(()));
    bridge.destroy();

    assert!(host.is_current(&native));
    assert!(!bridge.is_intercepting());
    assert_eq!(bridge.subscriber_count(HookSet::Update), 0);
    assert_eq!(bridge.pending_callbacks(), 0);

    // Second destroy is harmless.
    bridge.destroy();
    assert!(host.is_current(&native));
}

#[test]
fn dropping_last_handle_restores_native_scheduler() {
    let (host, native) = FrameHost::with_native_queue();
    let native: Rc<dyn FrameScheduler> = native;
    {
        let bridge = Bridge::new(
            BridgeConfig::default(),
            BridgeEnv::offline_with_host(host.clone()),
        );
        let clone = bridge.clone();
        drop(bridge);
        assert!(!host.is_current(&native));
        clone.step(1);
    }
    assert!(host.is_current(&native));
}

#[tokio::test(start_paused = true)]
async fn render_frames_length_is_independent_of_capture_latency() {
    let bridge = offline(60.0);
    let calls = Rc::new(RefCell::new(Vec::new()));
    let started = tokio::time::Instant::now();

    let c = calls.clone();
    let b = bridge.clone();
    let mut progress = ProgressFn(move |index: u32, frame: tandem_bridge::FrameInfo| {
        let c = c.clone();
        let b = b.clone();
        async move {
            // The next frame must not start while this one is still capturing.
            assert_eq!(b.frame(), frame.frame);
            c.borrow_mut().push(index);
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(())
        }
    });

    let rendered = bridge
        .render_frames(300, &mut progress)
        .await
        .expect("export pass");

    assert_eq!(rendered, 300);
    assert_eq!(calls.borrow().len(), 300);
    assert_eq!(calls.borrow().first(), Some(&1));
    assert_eq!(calls.borrow().last(), Some(&300));
    assert_eq!(bridge.frame(), 300);
    assert!((bridge.time() - 5000.0).abs() < 1e-6);
    assert!(started.elapsed() >= std::time::Duration::from_secs(15));
}

#[tokio::test]
async fn render_frames_surfaces_progress_failure_without_rollback() {
    let bridge = offline(30.0);
    let mut progress = ProgressFn(|index: u32, _frame: tandem_bridge::FrameInfo| async move {
        if index == 3 {
            anyhow::bail!("encoder rejected frame");
        }
        Ok(())
    });

    let err = bridge
        .render_frames(10, &mut progress)
        .await
        .expect_err("progress failure propagates");
    assert!(matches!(err, BridgeError::Progress { frame: 3, .. }));
    assert_eq!(bridge.frame(), 3);
}

#[tokio::test]
async fn render_frames_without_progress_still_steps() {
    let bridge = offline(25.0);
    let n = bridge
        .render_frames(25, &mut NoProgress)
        .await
        .expect("no progress sink");
    assert_eq!(n, 25);
    assert_eq!(bridge.time(), 1000.0);
}
