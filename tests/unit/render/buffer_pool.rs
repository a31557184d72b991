use super::*;

fn pool() -> OffscreenBufferPool {
    OffscreenBufferPool::new(BufferPoolOpts::default())
}

#[test]
fn released_buffers_are_reused_by_matching_key() {
    let mut p = pool();
    let a = p.acquire("stack.pass", 8, 8, false).unwrap();
    p.release(a).unwrap();
    let b = p.acquire("stack.pass", 8, 8, false).unwrap();
    let st = p.stats();
    assert_eq!(st.alloc_buffers, 1);
    assert_eq!(st.reused, 1);
    assert_eq!(p.get(b).unwrap().format(), PixelFormat::Rgba8Premul);

    // Different purpose or size never shares a bucket.
    let c = p.acquire("depth.color", 8, 8, false).unwrap();
    let d = p.acquire("stack.pass", 4, 8, false).unwrap();
    assert_ne!(b, c);
    assert_ne!(c, d);
    assert_eq!(p.stats().alloc_buffers, 3);
}

#[test]
fn checked_out_buffers_are_never_handed_out_twice() {
    let mut p = pool();
    let a = p.acquire("stack.pass", 8, 8, false).unwrap();
    let b = p.acquire("stack.pass", 8, 8, false).unwrap();
    assert_ne!(a, b);
    assert_eq!(p.stats().checked_out, 2);
}

#[test]
fn depth_buffers_use_single_channel_float() {
    let mut p = pool();
    let d = p.acquire("depth.aux", 4, 4, true).unwrap();
    let buf = p.get(d).unwrap();
    assert_eq!(buf.format(), PixelFormat::R32Float);
    assert_eq!(buf.depth().unwrap().len(), 16);
    assert!(matches!(buf.color(), Err(PipelineError::FormatMismatch(_))));

    let c = p.acquire("depth.aux", 4, 4, false).unwrap();
    assert!(matches!(
        p.get(c).unwrap().depth(),
        Err(PipelineError::FormatMismatch(_))
    ));
}

#[test]
fn resize_invalidates_idle_and_checked_out_buffers() {
    let mut p = pool();
    assert!(p.resize(Canvas::new(8, 8).unwrap()));
    let idle = p.acquire("stack.pass", 8, 8, false).unwrap();
    let busy = p.acquire("stack.pass", 8, 8, false).unwrap();
    p.release(idle).unwrap();
    assert_eq!(p.stats().retained_buffers, 1);

    assert!(!p.resize(Canvas::new(8, 8).unwrap()));
    assert!(p.resize(Canvas::new(16, 8).unwrap()));
    assert_eq!(p.stats().retained_buffers, 0);
    assert!(p.get(idle).is_err());

    // Still usable until released, then dropped instead of retained.
    assert!(p.get(busy).is_ok());
    p.release(busy).unwrap();
    assert_eq!(p.stats().retained_buffers, 0);
    assert_eq!(p.stats().dropped_on_release, 1);

    let fresh = p.acquire("stack.pass", 16, 8, false).unwrap();
    assert_eq!(p.get(fresh).unwrap().width(), 16);
}

#[test]
fn stale_handles_are_rejected() {
    let mut p = pool();
    let a = p.acquire("stack.pass", 2, 2, false).unwrap();
    p.release(a).unwrap();
    assert!(p.release(a).is_err());
    assert!(p.get(a).is_err());
}

#[test]
fn bucket_and_byte_caps_are_honored() {
    let mut p = OffscreenBufferPool::new(BufferPoolOpts {
        max_pool_bytes: 8 * 8 * 4,
        max_buffers_per_bucket: 8,
    });
    let a = p.acquire("stack.pass", 8, 8, false).unwrap();
    let b = p.acquire("stack.pass", 8, 8, false).unwrap();
    p.release(a).unwrap();
    p.release(b).unwrap();
    let st = p.stats();
    assert_eq!(st.retained_buffers, 1);
    assert_eq!(st.dropped_on_release, 1);

    let mut p = OffscreenBufferPool::new(BufferPoolOpts {
        max_pool_bytes: 1 << 20,
        max_buffers_per_bucket: 1,
    });
    let a = p.acquire("stack.pass", 8, 8, false).unwrap();
    let b = p.acquire("stack.pass", 8, 8, false).unwrap();
    p.release(a).unwrap();
    p.release(b).unwrap();
    assert_eq!(p.stats().retained_buffers, 1);
}

#[test]
fn pass_buffers_reject_self_aliasing() {
    let mut p = pool();
    let a = p.acquire("stack.pass", 2, 2, false).unwrap();
    let b = p.acquire("stack.pass", 2, 2, false).unwrap();

    let err = p.with_pass_buffers(&[a, b], a, |_, _| Ok(())).unwrap_err();
    assert!(matches!(err, PipelineError::Aliasing(_)));

    p.get_mut(a).unwrap().color_mut().unwrap().fill(7);
    p.with_pass_buffers(&[a], b, |inputs, out| {
        let src = inputs[0].color()?.to_vec();
        out.color_mut()?.copy_from_slice(&src);
        Ok(())
    })
    .unwrap();
    assert!(p.get(b).unwrap().color().unwrap().iter().all(|&v| v == 7));
}

#[test]
fn zero_sized_acquire_is_a_validation_error() {
    let mut p = pool();
    assert!(matches!(
        p.acquire("stack.pass", 0, 4, false),
        Err(PipelineError::Validation(_))
    ));
}
