//! Compile-time check of the concurrency claim in the engine's docs:
//! an `Engine` has no interior mutability, so it's `Send` whenever its
//! observer is — just not `Sync`, since nothing needs shared access to
//! one instance.

use feecore::Engine;

fn assert_send<T: Send>() {}

#[test]
fn engine_is_send_when_its_observer_is()
{
    assert_send::<Engine<()>>();
}
