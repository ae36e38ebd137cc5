#![no_main]

//! Fuzz target for the byte-stream adapter's C callbacks.
//! Drives write/seek/position/size in arbitrary order against a sink that
//! fails or panics at an arbitrary step; nothing may escape the callbacks
//! and the sink must be left alone after the first failure.

use arbitrary::Arbitrary;
use heif_context::HeifStreamWriter;
use libfuzzer_sys::fuzz_target;
use std::io::{self, Cursor, Seek, SeekFrom, Write};

#[derive(Arbitrary, Debug)]
enum Call {
    Write(Vec<u8>),
    Seek(i64),
    Position,
    Size,
}

#[derive(Arbitrary, Debug)]
struct Script {
    fail_at: u8,
    panic_instead: bool,
    calls: Vec<Call>,
}

struct FlakySink {
    inner: Cursor<Vec<u8>>,
    fail_at: usize,
    panic_instead: bool,
    touches: usize,
}

impl FlakySink {
    fn touch(&mut self) -> io::Result<()> {
        self.touches += 1;
        if self.touches == self.fail_at {
            if self.panic_instead {
                panic!("flaky sink panicked");
            }
            return Err(io::Error::new(io::ErrorKind::Other, "flaky sink failed"));
        }
        Ok(())
    }
}

impl Write for FlakySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.touch()?;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for FlakySink {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.touch()?;
        self.inner.seek(pos)
    }
}

fuzz_target!(|script: Script| {
    std::panic::set_hook(Box::new(|_| {}));

    let mut sink = FlakySink {
        inner: Cursor::new(Vec::new()),
        fail_at: script.fail_at as usize,
        panic_instead: script.panic_instead,
        touches: 0,
    };
    let callbacks = HeifStreamWriter::<&mut FlakySink>::callbacks();
    let mut adapter = HeifStreamWriter::new(&mut sink);

    let mut touches_at_failure = None;
    for call in script.calls.iter().take(64) {
        let userdata = adapter.userdata();
        unsafe {
            match call {
                Call::Write(bytes) => {
                    (callbacks.write)(
                        std::ptr::null_mut(),
                        bytes.as_ptr().cast(),
                        bytes.len(),
                        userdata,
                    );
                }
                Call::Seek(pos) => {
                    (callbacks.seek)(*pos, userdata);
                }
                Call::Position => {
                    (callbacks.get_position)(userdata);
                }
                Call::Size => {
                    (callbacks.get_size)(userdata);
                }
            }
        }
        if adapter.has_failure() && touches_at_failure.is_none() {
            touches_at_failure = Some(adapter.get_mut().touches);
        }
    }

    if let Some(touches) = touches_at_failure {
        assert_eq!(adapter.get_mut().touches, touches);
    }
    drop(adapter.take_failure());
});
