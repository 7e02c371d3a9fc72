//! Runs several clients against the in-memory backend: each signs in, walks
//! around, and sends alerts that the others receive.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

use crate::adapters::device::{LogNotifier, ScriptedLocation};
use crate::adapters::memory::{MemoryAuthenticator, MemoryStore};
use crate::adapters::mercator::WebMercatorViewport;
use crate::alerts::AlertSender;
use crate::auth::{AuthFailure, Credentials, sign_in_or_register};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::ports::{PermissionStatus, TimeProvider};
use crate::session::{ActiveSession, Session, SessionServices, sender_display_name};
use crate::state::{Label, MapState};
use crate::types::{AlertKind, Coords, Position, UserRecord};

const DELIVERY_TIMEOUT: Duration = Duration::from_millis(250);
const MAX_STEP_M: f64 = 15.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationPlan {
    pub clients: usize,
    pub steps: usize,
    pub step: Duration,
    /// Every `alert_every` steps one client sends an alert. Zero disables alerts.
    pub alert_every: usize,
    pub seed: u64,
    pub origin: Coords,
}

impl Default for SimulationPlan {
    fn default() -> Self {
        Self {
            clients: 3,
            steps: 20,
            step: Duration::from_secs(1),
            alert_every: 5,
            seed: 7,
            origin: Coords::new(-23.5505, -46.6333),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("client {client} could not sign in: {source}")]
    SignIn {
        client: usize,
        #[source]
        source: AuthFailure,
    },
    #[error("client {client} could not start: {source}")]
    Start {
        client: usize,
        #[source]
        source: SyncError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub started_at: String,
    pub clients: usize,
    pub alerts_sent: usize,
    /// Live alerts received across all clients.
    pub alerts_received: usize,
    pub users_located: usize,
    /// Labels as seen by the first client.
    pub labels: Vec<Label>,
}

struct Client {
    session: Session,
    location: ScriptedLocation,
    active: ActiveSession,
    coords: Coords,
    authored: usize,
}

pub async fn run_simulation<T: TimeProvider>(
    config: &SyncConfig,
    plan: &SimulationPlan,
    time: T,
) -> Result<SimulationReport, SimulationError> {
    let started_at = time
        .now()
        .format(&Rfc3339)
        .unwrap_or_else(|_| time.now_millis().to_string());
    let store = MemoryStore::new();
    let auth = MemoryAuthenticator::new();
    let mut rng = StdRng::seed_from_u64(plan.seed);

    let mut clients = Vec::with_capacity(plan.clients);
    for index in 0..plan.clients {
        let credentials = Credentials {
            email: format!("walker{index}@trackat.test"),
            password: format!("walker-{index}-secret"),
            username: Some(format!("Walker {index}")),
        };
        let signed_in = sign_in_or_register(&auth, &store, &time, &credentials)
            .await
            .map_err(|source| SimulationError::SignIn {
                client: index,
                source,
            })?;

        let location = ScriptedLocation::new(PermissionStatus::Undetermined);
        let coords = plan.origin.offset_m(
            rng.gen_range(-200.0..200.0),
            rng.gen_range(-200.0..200.0),
        );
        location.push(Position::new(coords, time.now_millis()));

        let services = SessionServices {
            store: store.clone(),
            location: location.clone(),
            notifier: LogNotifier::new(PermissionStatus::Undetermined),
            time: time.clone(),
            config: config.clone(),
        };
        let active = services
            .start(&signed_in.session)
            .await
            .map_err(|source| SimulationError::Start {
                client: index,
                source,
            })?;
        clients.push(Client {
            session: signed_in.session,
            location,
            active,
            coords,
            authored: 0,
        });
    }

    let mut alerts_sent = 0;
    let sender = AlertSender::new(store.clone(), time.clone());
    for step in 1..=plan.steps {
        time.sleep(plan.step).await;
        for client in &mut clients {
            client.coords = client.coords.offset_m(
                rng.gen_range(-MAX_STEP_M..MAX_STEP_M),
                rng.gen_range(-MAX_STEP_M..MAX_STEP_M),
            );
            client.location.push(Position::new(client.coords, time.now_millis()));
        }

        if plan.alert_every == 0 || step % plan.alert_every != 0 || clients.is_empty() {
            continue;
        }
        let author_index = step % clients.len();
        let author = &mut clients[author_index];
        let kind = AlertKind::ALL[step % AlertKind::ALL.len()];
        let name = sender_display_name(&author.session, &store.users());
        match sender.send(kind, &author.session.uid, Some(&name)).await {
            Ok(_) => {
                alerts_sent += 1;
                author.authored += 1;
            }
            Err(err) => warn!(%err, step, "simulated alert failed"),
        }
        tokio::task::yield_now().await;
    }

    let mut alerts_received = 0;
    for client in &mut clients {
        // Own alerts are never delivered back.
        let expected = alerts_sent - client.authored;
        let mut received = 0;
        while received < expected {
            match tokio::time::timeout(DELIVERY_TIMEOUT, client.active.alerts().recv()).await {
                Ok(Some(alert)) => {
                    debug!(to = %client.session.uid, alert = %alert.id, "delivered");
                    received += 1;
                }
                Ok(None) | Err(_) => break,
            }
        }
        alerts_received += received;
    }

    let labels = match clients.first_mut() {
        Some(first) => first_client_labels(first, config, plan, &store).await,
        None => Vec::new(),
    };
    let users_located = store
        .users()
        .iter()
        .filter(|user| user.is_locatable())
        .count();

    for client in &mut clients {
        client.active.stop();
    }

    let report = SimulationReport {
        started_at,
        clients: clients.len(),
        alerts_sent,
        alerts_received,
        users_located,
        labels,
    };
    info!(
        clients = report.clients,
        alerts_sent = report.alerts_sent,
        alerts_received = report.alerts_received,
        users_located = report.users_located,
        "simulation finished"
    );
    Ok(report)
}

/// Builds the first client's map from the latest presence snapshot.
async fn first_client_labels(
    client: &mut Client,
    config: &SyncConfig,
    plan: &SimulationPlan,
    store: &MemoryStore,
) -> Vec<Label> {
    let presence = client.active.presence();
    let mut latest: Vec<UserRecord> = Vec::new();
    while let Ok(Some(snapshot)) = tokio::time::timeout(DELIVERY_TIMEOUT, presence.recv()).await {
        latest = snapshot;
    }

    let viewport = WebMercatorViewport::from_region(plan.origin, 0.01, 400.0, 800.0);
    let mut state = MapState::new(&client.session.uid, config);
    state.set_users(latest, &viewport).await;
    if let Some(other) = state
        .users()
        .iter()
        .find(|user| user.uid != client.session.uid)
        .map(|user| user.uid.clone())
    {
        state.select_user(store, &other).await;
        debug!(selected = %other, history = state.history().len(), "selected user");
    }
    state.labels()
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use crate::testing::TestTime;

    #[tokio::test]
    async fn run_simulation__should_deliver_alerts_to_everyone_but_the_author() {
        // Given
        let plan = SimulationPlan {
            clients: 3,
            steps: 10,
            alert_every: 5,
            ..SimulationPlan::default()
        };
        let time = TestTime::at_millis(1_700_000_000_000);

        // When
        let report = run_simulation(&SyncConfig::default(), &plan, time.clone())
            .await
            .expect("simulation");

        // Then
        assert_eq!(report.clients, 3);
        assert_eq!(report.alerts_sent, 2);
        assert_eq!(report.alerts_received, 4);
        assert_eq!(report.users_located, 3);
        assert_eq!(report.labels.len(), 3);
        assert_eq!(
            report.labels.iter().filter(|label| label.text == "You").count(),
            1
        );
        assert_eq!(time.slept(), vec![Duration::from_secs(1); 10]);
    }

    #[tokio::test]
    async fn run_simulation__should_handle_no_clients() {
        let plan = SimulationPlan {
            clients: 0,
            ..SimulationPlan::default()
        };

        let report = run_simulation(&SyncConfig::default(), &plan, TestTime::at_millis(0))
            .await
            .expect("simulation");

        assert_eq!(report.alerts_sent, 0);
        assert!(report.labels.is_empty());
    }
}
