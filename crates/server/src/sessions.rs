use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use region_nav::explorer::ExplorerView;
use region_nav::{
    ClickOutcome, Explorer, FetchTicket, LayerDocument, LayerId, NavError, Outcome, Step,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::store::DataStore;

pub const MAX_SESSIONS: usize = 256;

pub struct Session {
    pub explorer: Explorer<LayerDocument>,
    pub touched: DateTime<Utc>,
}

pub type SessionHandle = Arc<Mutex<Session>>;

#[derive(Clone, Default)]
pub struct Sessions {
    inner: Arc<RwLock<HashMap<Uuid, SessionHandle>>>,
}

impl Sessions {
    /// Register a session, evicting the least recently used one when full.
    pub async fn insert(&self, explorer: Explorer<LayerDocument>) -> Uuid {
        let id = Uuid::new_v4();
        let mut map = self.inner.write().await;
        if map.len() >= MAX_SESSIONS {
            let mut oldest: Option<(Uuid, DateTime<Utc>)> = None;
            for (key, handle) in map.iter() {
                // busy sessions are in use, so not the oldest
                let Ok(session) = handle.try_lock() else {
                    continue;
                };
                if oldest.map_or(true, |(_, t)| session.touched < t) {
                    oldest = Some((*key, session.touched));
                }
            }
            if let Some((key, _)) = oldest {
                tracing::debug!("Evicting session {key}");
                map.remove(&key);
            }
        }
        map.insert(
            id,
            Arc::new(Mutex::new(Session {
                explorer,
                touched: Utc::now(),
            })),
        );
        id
    }

    pub async fn get(&self, id: &Uuid) -> Option<SessionHandle> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &Uuid) -> bool {
        self.inner.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Descend { id: String },
    Ascend,
    Reset,
    Focus { id: String },
    Release,
    Click { layer: LayerId, feature: usize },
    Hover { layer: LayerId, feature: usize },
    Unhover { layer: LayerId },
    ClickMarker { layer: LayerId, marker: usize },
}

/// What an action did before any fetch it requested has run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Applied {
    Step(Step),
    Click(ClickOutcome),
    Hover { hovered: bool },
    Done,
}

impl Applied {
    pub fn ticket(&self) -> Option<&FetchTicket> {
        match self {
            Applied::Step(Step::Fetch(t)) | Applied::Click(ClickOutcome::Navigate(Step::Fetch(t))) => {
                Some(t)
            }
            _ => None,
        }
    }
}

pub fn apply(explorer: &mut Explorer<LayerDocument>, action: Action) -> Result<Applied, NavError> {
    Ok(match action {
        Action::Descend { id } => Applied::Step(explorer.descend(&id)?),
        Action::Ascend => Applied::Step(explorer.ascend()?),
        Action::Reset => Applied::Step(explorer.reset()?),
        Action::Focus { id } => {
            explorer.focus(&id)?;
            Applied::Done
        }
        Action::Release => {
            explorer.release();
            Applied::Done
        }
        Action::Click { layer, feature } => Applied::Click(explorer.click(layer, feature)?),
        Action::Hover { layer, feature } => Applied::Hover {
            hovered: explorer.hover(layer, feature),
        },
        Action::Unhover { layer } => {
            explorer.unhover(layer);
            Applied::Done
        }
        Action::ClickMarker { layer, marker } => {
            Applied::Click(explorer.click_marker(layer, marker)?)
        }
    })
}

#[derive(Serialize)]
pub struct Snapshot {
    pub id: Uuid,
    #[serde(flatten)]
    pub view: ExplorerView,
    pub map: LayerDocument,
}

impl Snapshot {
    pub fn of(id: Uuid, session: &Session) -> Self {
        Self {
            id,
            view: session.explorer.view(),
            map: session.explorer.renderer().clone(),
        }
    }
}

#[derive(Serialize)]
pub struct ActionResponse {
    #[serde(flatten)]
    pub snapshot: Snapshot,
    pub applied: Applied,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

/// Apply `action` to a session. A fetch the action asks for runs without
/// holding the session lock; its result is applied only if no other action
/// superseded it meanwhile.
pub async fn run_action(
    store: &DataStore,
    id: Uuid,
    handle: &SessionHandle,
    action: Action,
) -> Result<ActionResponse, NavError> {
    let applied = {
        let mut session = handle.lock().await;
        session.touched = Utc::now();
        apply(&mut session.explorer, action)?
    };

    let outcome = match applied.ticket() {
        Some(ticket) => {
            let data = store
                .get_object(&ticket.location)
                .await
                .map_err(NavError::from);
            let mut session = handle.lock().await;
            let outcome = session.explorer.complete(ticket, data)?;
            if outcome == Outcome::Stale {
                tracing::debug!("Session {id}: dropped stale {}", ticket.location);
            }
            Some(outcome)
        }
        None => match &applied {
            Applied::Step(Step::Ready(o))
            | Applied::Click(ClickOutcome::Navigate(Step::Ready(o))) => Some(o.clone()),
            _ => None,
        },
    };

    let session = handle.lock().await;
    Ok(ActionResponse {
        snapshot: Snapshot::of(id, &session),
        applied,
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use region_nav::geometry::{parse_collection, FeatureCollection};
    use region_nav::{BaseLayers, RegionIndex};
    use serde_json::json;

    fn explorer() -> Explorer<LayerDocument> {
        let index = RegionIndex::from_value(json!([
            {"id": "11", "name": "Aceh", "regencies": [
                {"id": "1101", "name": "Simeulue",
                 "file": "indonesia-district/id11_aceh/id1101_simeulue/id1101_simeulue.geojson",
                 "districts": []}
            ]},
            {"id": "51", "name": "Bali", "regencies": []}
        ]))
        .unwrap();
        let square = |props: serde_json::Value, x: f64, y: f64| {
            json!({"type": "Feature", "properties": props, "geometry": {
                "type": "Polygon",
                "coordinates": [[[x, y], [x + 1.0, y], [x + 1.0, y + 1.0], [x, y + 1.0], [x, y]]]
            }})
        };
        let collection =
            |value: serde_json::Value| parse_collection(value.to_string().as_bytes()).unwrap();
        let provinces: FeatureCollection = collection(json!({
            "type": "FeatureCollection",
            "features": [
                square(json!({"name": "Aceh", "prov_id": "11"}), 95.0, 3.0),
                square(json!({"name": "Bali", "prov_id": "51"}), 115.0, -8.5)
            ]
        }));
        let regencies: FeatureCollection = collection(json!({
            "type": "FeatureCollection",
            "features": [square(json!({"name": "Kab. Simeulue", "prov_id": "11"}), 96.0, 2.5)]
        }));
        let base = BaseLayers {
            provinces,
            regencies,
        };
        let mut ex = Explorer::new(Arc::new(index), Arc::new(base), LayerDocument::default());
        ex.start().unwrap();
        ex
    }

    #[test]
    fn test_actions_deserialize() {
        let a: Action = serde_json::from_value(json!({"action": "descend", "id": "11"})).unwrap();
        assert!(matches!(a, Action::Descend { id } if id == "11"));
        let a: Action =
            serde_json::from_value(json!({"action": "click_marker", "layer": 3, "marker": 0}))
                .unwrap();
        assert!(matches!(a, Action::ClickMarker { layer: LayerId(3), marker: 0 }));
        assert!(serde_json::from_value::<Action>(json!({"action": "teleport"})).is_err());
    }

    #[test]
    fn test_apply_descend_and_fetch_ticket() {
        let mut ex = explorer();
        let applied = apply(&mut ex, Action::Descend { id: "11".into() }).unwrap();
        assert!(applied.ticket().is_none());
        assert!(matches!(applied, Applied::Step(Step::Ready(Outcome::Rendered { .. }))));

        let applied = apply(&mut ex, Action::Descend { id: "1101".into() }).unwrap();
        let ticket = applied.ticket().unwrap();
        assert!(ticket.location.ends_with("id1101_simeulue.geojson"));
        assert!(ex.is_loading());
    }

    #[test]
    fn test_apply_respects_lock() {
        let mut ex = explorer();
        apply(&mut ex, Action::Focus { id: "11".into() }).unwrap();
        let layer = ex.active_layer().unwrap().id;
        let applied = apply(&mut ex, Action::Click { layer, feature: 1 }).unwrap();
        assert_eq!(applied, Applied::Click(ClickOutcome::Ignored));
        let err = apply(&mut ex, Action::Descend { id: "51".into() }).unwrap_err();
        assert!(matches!(err, NavError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_run_action_rolls_back_when_fetch_fails() {
        let store = DataStore::local(std::env::temp_dir().join("nusamap-missing-data-root"));
        let sessions = Sessions::default();
        let id = sessions.insert(explorer()).await;
        let handle = sessions.get(&id).await.unwrap();

        run_action(&store, id, &handle, Action::Descend { id: "11".into() })
            .await
            .unwrap();
        let err = run_action(&store, id, &handle, Action::Descend { id: "1101".into() })
            .await
            .err()
            .unwrap();
        assert!(matches!(err, NavError::SourceUnavailable(_)));

        let session = handle.lock().await;
        assert_eq!(session.explorer.selection().level, region_nav::Level::Regency);
        assert_eq!(session.explorer.renderer().features.len(), 1);
    }

    #[tokio::test]
    async fn test_sessions_evict_when_full() {
        let sessions = Sessions::default();
        let first = sessions.insert(explorer()).await;
        for _ in 1..MAX_SESSIONS {
            sessions.insert(explorer()).await;
        }
        sessions.get(&first).await.unwrap().lock().await.touched =
            Utc::now() - chrono::TimeDelta::hours(1);
        assert_eq!(sessions.len().await, MAX_SESSIONS);
        sessions.insert(explorer()).await;
        assert_eq!(sessions.len().await, MAX_SESSIONS);
        assert!(sessions.get(&first).await.is_none());
    }
}
