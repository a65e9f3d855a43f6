//! Uses the synchronization and IPC services from several threads at once.
use mkos_kernel::{
    EventGroup, EventGroupWaitFlags, MessageBuffer, Mutex, Queue, RecursiveMutex,
    ReceiveError, Semaphore,
};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

const DATA_READY: u32 = 1 << 0;
const DONE: u32 = 1 << 1;

#[test]
fn producer_consumer_pipeline() {
    let _ = env_logger::try_init();

    let queue = Arc::new(Queue::new(4).unwrap());
    let events = Arc::new(EventGroup::default());

    let producer = {
        let queue = Arc::clone(&queue);
        let events = Arc::clone(&events);
        thread::spawn(move || {
            for i in 0..100u32 {
                queue.send(i, 10_000).unwrap();
                events.set_bits(DATA_READY);
            }
            events.set_bits(DONE);
        })
    };

    let mut received = Vec::new();
    loop {
        match queue.receive(1) {
            Ok(x) => received.push(x),
            Err(ReceiveError::Timeout) => {
                if events.get_bits() & DONE != 0 && queue.is_empty() {
                    break;
                }
            }
        }
    }
    producer.join().unwrap();

    assert_eq!(received, (0..100).collect::<Vec<_>>());
    let bits = events.wait_bits(
        DATA_READY | DONE,
        EventGroupWaitFlags::ALL | EventGroupWaitFlags::CLEAR,
        0,
    );
    assert_eq!(bits, DATA_READY | DONE);
    assert_eq!(events.get_bits(), 0);
}

#[test]
fn mutex_serializes_critical_sections() {
    let mutex = Arc::new(Mutex::new());
    let inside = Arc::new(AtomicUsize::new(0));
    let total = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let (mutex, inside, total) =
                (Arc::clone(&mutex), Arc::clone(&inside), Arc::clone(&total));
            thread::spawn(move || {
                for _ in 0..50 {
                    mutex.take(100_000).unwrap();
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                    total.fetch_add(1, Ordering::Relaxed);
                    inside.fetch_sub(1, Ordering::SeqCst);
                    mutex.give().unwrap();
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(total.load(Ordering::Relaxed), 200);
    assert!(!mutex.is_locked());
}

#[test]
fn recursive_mutex_blocks_other_threads_until_fully_released() {
    let mutex = Arc::new(RecursiveMutex::new());
    mutex.take(0).unwrap();
    mutex.take(0).unwrap();
    assert_eq!(mutex.recursion_count(), 2);

    let other = {
        let mutex = Arc::clone(&mutex);
        move || mutex.take(0).is_ok()
    };
    assert!(!thread::spawn(other.clone()).join().unwrap());

    mutex.give().unwrap();
    assert!(!thread::spawn(other.clone()).join().unwrap());

    mutex.give().unwrap();
    assert!(thread::spawn(other).join().unwrap());
    assert_eq!(mutex.recursion_count(), 1);
    assert_ne!(mutex.owner(), Some(thread::current().id()));
}

#[test]
fn counting_semaphore_limits_concurrency() {
    let sem = Arc::new(Semaphore::new(2, 2));
    let inside = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..6)
        .map(|_| {
            let (sem, inside) = (Arc::clone(&sem), Arc::clone(&inside));
            thread::spawn(move || {
                for _ in 0..20 {
                    sem.take(100_000).unwrap();
                    assert!(inside.fetch_add(1, Ordering::SeqCst) < 2);
                    inside.fetch_sub(1, Ordering::SeqCst);
                    sem.give().unwrap();
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(sem.count(), 2);
}

#[test]
fn message_buffer_streams_between_threads() {
    let mb = Arc::new(MessageBuffer::new(8).unwrap());
    let payload: Vec<u8> = (0..=255).collect();

    let sender = {
        let mb = Arc::clone(&mb);
        let payload = payload.clone();
        thread::spawn(move || {
            let mut sent = 0;
            for chunk in payload.chunks(5) {
                sent += mb.send(chunk, 10_000);
            }
            sent
        })
    };

    let mut received = Vec::new();
    let mut buf = [0u8; 7];
    while received.len() < payload.len() {
        let n = mb.receive(&mut buf, 10_000);
        received.extend_from_slice(&buf[..n]);
    }

    assert_eq!(sender.join().unwrap(), payload.len());
    assert_eq!(received, payload);
}
