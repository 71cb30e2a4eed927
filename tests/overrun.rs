//! Overrun detection, loss estimation, resynchronization, and FIFOs built
//! around caller-supplied index cells.

use std::thread;
use std::time::Duration;

use framefifo::{Fifo, FifoError, FifoIndex, FifoReader, FifoWriter, Iovec, Timeout};

const FRAME_SIZE: u32 = 4;

#[test]
fn lapped_reader_reports_loss_then_reads_the_survivors() {
    let mut storage = [0u8; 24];
    let fifo = Fifo::new(6, FRAME_SIZE, &mut storage, false);
    let mut writer = FifoWriter::new(&fifo);
    let mut reader = FifoReader::new(&fifo, false);

    // The reader pauses while 20 frames pour through a 6-frame FIFO.
    for value in 0u8..20 {
        assert_eq!(writer.write(&[value; 4], Timeout::NonBlocking), Ok(1));
    }

    let mut iovec = [Iovec::default(); 2];
    let err = reader
        .obtain(&mut iovec, 6, Timeout::NonBlocking)
        .unwrap_err();
    let FifoError::Overrun { lost } = err else {
        panic!("expected an overrun, got {err}");
    };
    // 20 written, 6 still present: 14 dropped.
    assert_eq!(lost, 14);

    // Resynchronized: the survivors are the last six frames, in order.
    let mut dst = [0u8; 24];
    assert_eq!(reader.read(&mut dst, Timeout::NonBlocking), Ok(6));
    for (i, chunk) in dst.chunks_exact(4).enumerate() {
        assert_eq!(chunk, &[14 + i as u8; 4]);
    }
}

#[test]
fn loss_is_bounded_by_the_overrun_size() {
    let mut storage = [0u8; 24];
    let fifo = Fifo::new(6, FRAME_SIZE, &mut storage, false);
    let mut writer = FifoWriter::new(&fifo);
    let mut reader = FifoReader::new(&fifo, false);

    let overrun = 75u32;
    for value in 0..overrun {
        writer
            .write(&value.to_le_bytes(), Timeout::NonBlocking)
            .unwrap();
    }

    let mut iovec = [Iovec::default(); 2];
    match reader.obtain(&mut iovec, 1, Timeout::NonBlocking) {
        Err(FifoError::Overrun { lost }) => {
            assert!(lost >= overrun - 6 && lost <= overrun, "lost = {lost}");
        }
        other => panic!("expected an overrun, got {other:?}"),
    }
}

#[test]
fn a_lap_mid_stream_keeps_the_remainder_in_order() {
    let mut storage = [0u8; 24];
    let fifo = Fifo::new(6, FRAME_SIZE, &mut storage, false);
    let mut writer = FifoWriter::new(&fifo);
    let mut reader = FifoReader::new(&fifo, false);

    writer.write(&[1u8; 8], Timeout::NonBlocking).unwrap();
    let mut dst = [0u8; 8];
    assert_eq!(reader.read(&mut dst, Timeout::NonBlocking), Ok(2));

    // Now the writer sprints far ahead of the resting reader.
    for value in 10u8..40 {
        writer.write(&[value; 4], Timeout::NonBlocking).unwrap();
    }

    assert!(matches!(
        reader.read(&mut dst, Timeout::NonBlocking),
        Err(FifoError::Overrun { .. })
    ));

    // Everything after the resync is contiguous and ordered.
    let mut survivors = [0u8; 24];
    assert_eq!(reader.read(&mut survivors, Timeout::NonBlocking), Ok(6));
    for (i, chunk) in survivors.chunks_exact(4).enumerate() {
        assert_eq!(chunk, &[34 + i as u8; 4]);
    }
}

#[test]
fn overrun_under_concurrent_pressure_recovers() {
    const FRAMES: u32 = 20_000;
    let mut storage = [0u8; 6 * FRAME_SIZE as usize];
    let fifo = Fifo::new(6, FRAME_SIZE, &mut storage, false);

    thread::scope(|scope| {
        scope.spawn(|| {
            let mut writer = FifoWriter::new(&fifo);
            for seq in 0..FRAMES {
                writer
                    .write(&seq.to_le_bytes(), Timeout::NonBlocking)
                    .unwrap();
            }
        });

        scope.spawn(|| {
            let mut reader = FifoReader::new(&fifo, false);
            let mut last: Option<u32> = None;
            let deadline = std::time::Instant::now() + Duration::from_secs(30);
            // The final frame stays in the buffer once the writer finishes,
            // so chasing it terminates no matter how often we get lapped.
            while last != Some(FRAMES - 1) {
                assert!(
                    std::time::Instant::now() < deadline,
                    "reader never caught up"
                );
                let mut payload = [0u8; 4];
                match reader.read(&mut payload, Timeout::NonBlocking) {
                    Ok(0) | Err(FifoError::Overrun { .. }) => thread::yield_now(),
                    Ok(_) => {
                        let seq = u32::from_le_bytes(payload);
                        // Laps drop frames but never reorder them.
                        if let Some(prev) = last {
                            assert!(seq > prev, "sequence went backwards: {prev} -> {seq}");
                        }
                        last = Some(seq);
                    }
                    Err(err) => panic!("unexpected error: {err}"),
                }
            }
        });
    });
}

#[test]
fn caller_supplied_indices_drive_the_same_protocol() {
    let mut storage = [0u8; 24];
    let shared_rear = FifoIndex::new();
    let shared_front = FifoIndex::new();
    let fifo = Fifo::with_shared_indices(
        6,
        FRAME_SIZE,
        &mut storage,
        &shared_rear,
        Some(&shared_front),
    );
    let mut writer = FifoWriter::new(&fifo);
    let mut reader = FifoReader::new(&fifo, true);

    assert_eq!(writer.write(&[9u8; 24], Timeout::NonBlocking), Ok(6));

    let mut dst = [0u8; 24];
    assert_eq!(reader.read(&mut dst, Timeout::NonBlocking), Ok(6));
    assert_eq!(dst, [9u8; 24]);
}

#[test]
fn late_attaching_writer_adopts_the_existing_rear() {
    let mut storage = [0u8; 24];
    let shared_rear = FifoIndex::new();
    let fifo = Fifo::with_shared_indices(6, FRAME_SIZE, &mut storage, &shared_rear, None);

    {
        let mut writer = FifoWriter::new(&fifo);
        writer.write(&[1u8; 16], Timeout::NonBlocking).unwrap();
    }

    // A replacement writer continues from the published rear rather than
    // rewinding to zero.
    let mut writer = FifoWriter::new(&fifo);
    writer.write(&[2u8; 8], Timeout::NonBlocking).unwrap();

    let mut reader = FifoReader::new(&fifo, false);
    let mut dst = [0u8; 24];
    assert_eq!(reader.read(&mut dst, Timeout::NonBlocking), Ok(6));
    assert_eq!(&dst[..16], &[1u8; 16]);
    assert_eq!(&dst[16..], &[2u8; 8]);
}
