use tokio::signal::unix::SignalKind;
use tokio::sync::mpsc;

/// Merges several unix signals into one receiver.
pub struct SignalHandler {
	signal_send: mpsc::Sender<SignalKind>,
	signal_recv: mpsc::Receiver<SignalKind>,
}

impl Default for SignalHandler {
	fn default() -> Self {
		let (signal_send, signal_recv) = mpsc::channel(1);
		Self {
			signal_send,
			signal_recv,
		}
	}
}

impl SignalHandler {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_signal(self, kind: SignalKind) -> std::io::Result<Self> {
		let mut signal = tokio::signal::unix::signal(kind)?;

		let send = self.signal_send.clone();
		tokio::spawn(async move {
			while signal.recv().await.is_some() {
				if send.send(kind).await.is_err() {
					break;
				}
			}
		});

		Ok(self)
	}

	/// Waits for the next signal. The handler holds a sender itself, so this
	/// only returns `None` once the runtime is shutting down.
	pub async fn recv(&mut self) -> Option<SignalKind> {
		self.signal_recv.recv().await
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use tokio::process::Command;

	use super::*;

	#[tokio::test]
	async fn receives_raised_signals() {
		let mut handler = SignalHandler::new().with_signal(SignalKind::user_defined1()).unwrap();

		Command::new("kill")
			.arg("-s")
			.arg("USR1")
			.arg(std::process::id().to_string())
			.status()
			.await
			.expect("failed to send SIGUSR1");

		let kind = tokio::time::timeout(Duration::from_secs(1), handler.recv())
			.await
			.expect("failed to receive signal");
		assert_eq!(kind, Some(SignalKind::user_defined1()));
	}
}
