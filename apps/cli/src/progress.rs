use bulkup_upload::UploadEvent;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}";

/// Convert a byte count into a human readable string using IEC units.
pub fn human_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let b = bytes as f64;
    if b >= GB {
        format!("{:.2} GiB", b / GB)
    } else if b >= MB {
        format!("{:.2} MiB", b / MB)
    } else if b >= KB {
        format!("{:.2} KiB", b / KB)
    } else {
        format!("{bytes} B")
    }
}

/// Draws upload events on a progress bar until told to stop.
pub struct ProgressReporter {
    done: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProgressReporter {
    pub fn spawn(mut events: mpsc::Receiver<UploadEvent>, total_bytes: u64, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total_bytes)
        };
        bar.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );

        let done = CancellationToken::new();
        let stop = done.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    event = events.recv() => match event {
                        Some(event) => render(&bar, event),
                        None => break,
                    },
                    _ = stop.cancelled() => {
                        while let Ok(event) = events.try_recv() {
                            render(&bar, event);
                        }
                        break;
                    }
                }
            }
            bar.finish();
        });

        Self { done, handle }
    }

    /// Drains queued events and finishes the bar.
    pub async fn finish(self) {
        self.done.cancel();
        let _ = self.handle.await;
    }
}

fn render(bar: &ProgressBar, event: UploadEvent) {
    match event {
        UploadEvent::TransactionStarted {
            transaction_id,
            total_files,
            ..
        } => bar.set_message(format!("{total_files} files, transaction {transaction_id}")),
        UploadEvent::ChunkUploaded { bytes, .. } => bar.inc(bytes),
        UploadEvent::FileCompleted {
            destination_path, ..
        } => bar.set_message(destination_path),
        UploadEvent::FileFailed {
            destination_path,
            error,
            ..
        } => bar.println(format!("failed: {destination_path}: {error}")),
        UploadEvent::Paused { .. } => bar.set_message("paused"),
        UploadEvent::BatchCompleted {
            completed_files,
            failed_files,
            ..
        } => bar.set_message(format!("{completed_files} uploaded, {failed_files} failed")),
    }
}
