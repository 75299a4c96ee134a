//! cpal streams are not `Send` on every platform, so each one is built and
//! owned by a dedicated thread. Dropping the [`StreamThread`] stops the stream
//! and releases the device.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

const IDLE_INTERVAL: Duration = Duration::from_millis(50);

/// Work the stream thread does between stop checks, e.g. collecting garbage
/// left behind by the audio callback.
pub(crate) type Idle = Box<dyn FnMut()>;

pub(crate) struct StreamThread {
    stop: Option<mpsc::Sender<()>>,
    join: Option<thread::JoinHandle<()>>,
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        // Disconnecting the channel is the stop signal
        self.stop.take();
        if let Some(join) = self.join.take()
            && join.join().is_err()
        {
            log::error!("audio stream thread panicked");
        }
    }
}

/// Run `build` on a new thread and keep the returned stream alive there.
///
/// Blocks until `build` has finished, returning its `ready` value or error.
pub(crate) fn spawn_stream<R, E, B>(name: &str, build: B) -> Result<(StreamThread, R), E>
where
    R: Send + 'static,
    E: From<io::Error> + Send + 'static,
    B: FnOnce() -> Result<(cpal::Stream, R, Idle), E> + Send + 'static,
{
    let (ready_tx, ready_rx) = mpsc::channel::<Result<R, E>>();
    let (stop_tx, stop_rx) = mpsc::channel::<()>();

    let join = thread::Builder::new().name(name.to_string()).spawn(move || {
        let (stream, ready, mut idle) = match build() {
            Ok(parts) => parts,
            Err(err) => {
                let _ = ready_tx.send(Err(err));
                return;
            }
        };
        if ready_tx.send(Ok(ready)).is_err() {
            return;
        }

        loop {
            match stop_rx.recv_timeout(IDLE_INTERVAL) {
                Err(RecvTimeoutError::Timeout) => idle(),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        drop(stream);
        idle();
    })?;

    match ready_rx.recv() {
        Ok(Ok(ready)) => Ok((
            StreamThread {
                stop: Some(stop_tx),
                join: Some(join),
            },
            ready,
        )),
        Ok(Err(err)) => {
            let _ = join.join();
            Err(err)
        }
        Err(_) => {
            let _ = join.join();
            Err(io::Error::other("audio stream thread exited during setup").into())
        }
    }
}
