//! Supervisor fuer die langlebigen Hintergrund-Tasks der Engine
//!
//! Haelt ein Wurzel-Token und die JoinHandles der benannten Tasks
//! (`dispatch-N`, `heartbeat`). Capture-Sessions erhalten Kind-Tokens,
//! ein Abbruch der Wurzel beendet also auch eine laufende Session.

use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Ein benannter Hintergrund-Task
struct BenannterTask {
    name: String,
    handle: JoinHandle<()>,
}

/// Besitzer aller Engine-Tasks und des gemeinsamen Abbruch-Signals
pub struct Supervisor {
    token: CancellationToken,
    tasks: Mutex<Vec<BenannterTask>>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::neu()
    }
}

impl Supervisor {
    pub fn neu() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Wurzel-Token (fuer Tasks, die mit der Engine leben)
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Neues Kind-Token, z.B. fuer eine Capture-Session
    pub fn kind_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn ist_beendet(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Startet einen benannten Task auf der aktuellen Runtime
    pub fn spawn<F>(&self, name: impl Into<String>, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        tracing::debug!(task = %name, "Starte Hintergrund-Task");
        let handle = tokio::spawn(task);
        self.tasks.lock().push(BenannterTask { name, handle });
    }

    /// Namen der noch laufenden Tasks
    pub fn laufende_tasks(&self) -> Vec<String> {
        self.tasks
            .lock()
            .iter()
            .filter(|t| !t.handle.is_finished())
            .map(|t| t.name.clone())
            .collect()
    }

    /// Bricht das Token ab und wartet begrenzt auf alle Tasks
    ///
    /// Tasks, die das Zeitlimit ueberschreiten, werden abgebrochen.
    /// Gibt die Anzahl sauber beendeter Tasks zurueck.
    pub async fn herunterfahren(&self, zeitlimit: Duration) -> usize {
        self.token.cancel();
        let tasks: Vec<BenannterTask> = std::mem::take(&mut *self.tasks.lock());

        let mut sauber = 0usize;
        for BenannterTask { name, handle } in tasks {
            let abort = handle.abort_handle();
            match tokio::time::timeout(zeitlimit, handle).await {
                Ok(Ok(())) => {
                    sauber += 1;
                    tracing::debug!(task = %name, "Task beendet");
                }
                Ok(Err(e)) => tracing::warn!(task = %name, fehler = %e, "Task mit Fehler beendet"),
                Err(_) => {
                    tracing::warn!(task = %name, "Task reagiert nicht – wird abgebrochen");
                    abort.abort();
                }
            }
        }
        sauber
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn herunterfahren_beendet_alle_tasks() {
        let sup = Supervisor::neu();
        for i in 0..3 {
            let token = sup.token();
            sup.spawn(format!("dispatch-{i}"), async move { token.cancelled().await });
        }
        assert_eq!(sup.laufende_tasks().len(), 3);

        assert_eq!(sup.herunterfahren(Duration::from_secs(1)).await, 3);
        assert!(sup.ist_beendet());
        assert!(sup.laufende_tasks().is_empty());
    }

    #[tokio::test]
    async fn kind_token_folgt_wurzel() {
        let sup = Supervisor::neu();
        let kind = sup.kind_token();
        let zweites = sup.kind_token();

        kind.cancel();
        assert!(!sup.ist_beendet(), "Kind darf die Wurzel nicht abbrechen");

        sup.herunterfahren(Duration::from_millis(10)).await;
        assert!(zweites.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn haengender_task_wird_abgebrochen() {
        let sup = Supervisor::neu();
        sup.spawn("heartbeat", std::future::pending::<()>());

        assert_eq!(sup.herunterfahren(Duration::from_millis(100)).await, 0);
    }
}
