use super::studio::ShutdownSender;
use super::{ShutdownReason, Studio};
use crate::error::{Result, StopmoError};
use std::sync::Arc;
use tracing::{error, info};

impl Studio {
    /// Run until a signal or a shutdown request arrives, then shut down.
    pub async fn run(&mut self) -> Result<i32> {
        info!("Studio is running");

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| StopmoError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers();

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| StopmoError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;
        Ok(match shutdown_reason {
            ShutdownReason::Error(_) => exit_code.max(1),
            _ => exit_code,
        })
    }

    fn setup_signal_handlers(&self) {
        // SIGTERM (service stop) - Unix only
        #[cfg(unix)]
        {
            let sender = Arc::clone(&self.shutdown_sender);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = match signal(SignalKind::terminate()) {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        error!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    notify(&sender, ShutdownReason::Signal("SIGTERM".to_string())).await;
                }
            });
        }

        // SIGINT (Ctrl+C) - cross-platform
        let sender = Arc::clone(&self.shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                notify(&sender, ShutdownReason::Signal("SIGINT".to_string())).await;
            }
        });
    }
}

async fn notify(sender: &ShutdownSender, reason: ShutdownReason) {
    if let Some(sender) = sender.lock().await.take() {
        let _ = sender.send(reason);
    }
}
