use tokio::sync::watch;

/// Set up a cancellation channel triggered by SIGINT/SIGTERM.
///
/// SIGTERM is what the manager delivers to child process groups; translating
/// it into the watch channel lets the event loop exit cooperatively and run
/// teardown.
pub fn setup_shutdown() -> Result<(watch::Sender<()>, watch::Receiver<()>), ctrlc::Error> {
    let (tx, rx) = watch::channel(());
    let shutdown_tx = tx.clone();
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received");
        let _ = shutdown_tx.send(());
    })?;
    Ok((tx, rx))
}
