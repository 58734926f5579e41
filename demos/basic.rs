use log::{LevelFilter, Log, Metadata, Record};
use smalloc::{AllocError, Handle, Heap, Strategy};

/// Prints every record to stderr as "[LEVEL] target: message".
struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        eprintln!("[{}] {}: {}", record.level(), record.target(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn log_alloc(heap: &Heap, handle: Handle, requested: usize) -> Result<(), AllocError> {
    println!("Requested {requested} bytes of memory");
    println!(
        "Received {:p} with {} usable bytes",
        heap.as_ptr(handle)?,
        heap.size_of(handle)?
    );
    Ok(())
}

fn main() -> Result<(), AllocError> {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }

    let mut heap = Heap::new()?;

    let a = heap.allocate(100)?;
    log_alloc(&heap, a, 100)?;

    let b = heap.allocate(200)?;
    log_alloc(&heap, b, 200)?;
    heap.payload_mut(b)?[..4].copy_from_slice(&[0xca, 0xfe, 0xba, 0xbe]);

    heap.deallocate(a)?;
    let c = heap.allocate_with_strategy(50, Strategy::BestFit)?;
    log_alloc(&heap, c, 50)?;

    if let Err(err) = heap.deallocate(b).and_then(|()| heap.deallocate(b)) {
        println!("Second free rejected: {err}");
    }

    let c = heap.reallocate(c, 4000)?;
    log_alloc(&heap, c, 4000)?;

    heap.coalesce();
    heap.dump();
    println!("{}", heap.stats());

    Ok(())
}
