//! Library of named stage positions.
//!
//! Every entry is checked against the stage limits when it is saved or
//! edited, so [`PositionStore::goto`] only ever requests reachable targets.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use daq_core::{
    AppResult, CaptureSettings, DaqError, Position, PositionId, StageLimits, TargetPosition,
};
use daq_hardware::DeviceFacade;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A named point the operator can return to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedPosition {
    /// Store-assigned id.
    pub id: PositionId,
    /// Display name.
    pub name: String,
    /// Free-form notes.
    pub description: Option<String>,
    /// Stage coordinates.
    pub position: Position,
    /// Camera settings to use at this spot, if any.
    pub camera_settings: Option<CaptureSettings>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Request to save a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPosition {
    /// Display name.
    pub name: String,
    /// Free-form notes.
    #[serde(default)]
    pub description: Option<String>,
    /// Stage coordinates.
    pub position: Position,
    /// Camera settings to use at this spot.
    #[serde(default)]
    pub camera_settings: Option<CaptureSettings>,
}

impl NewPosition {
    /// Named position without notes or camera settings.
    pub fn new(name: impl Into<String>, position: Position) -> Self {
        Self {
            name: name.into(),
            description: None,
            position,
            camera_settings: None,
        }
    }

    /// Attach notes.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Partial edit of a saved position. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionEdit {
    /// New name.
    pub name: Option<String>,
    /// New notes.
    pub description: Option<String>,
    /// New X.
    pub x: Option<f64>,
    /// New Y.
    pub y: Option<f64>,
    /// New Z.
    pub z: Option<f64>,
    /// New camera settings.
    pub camera_settings: Option<CaptureSettings>,
}

/// In-process position library bounded by the stage limits.
#[derive(Debug)]
pub struct PositionStore {
    positions: DashMap<PositionId, SavedPosition>,
    next_id: AtomicU64,
    limits: StageLimits,
}

impl PositionStore {
    /// Empty library; ids start at 1.
    pub fn new(limits: StageLimits) -> Self {
        Self {
            positions: DashMap::new(),
            next_id: AtomicU64::new(1),
            limits,
        }
    }

    /// Validate and store a new position.
    ///
    /// # Errors
    ///
    /// [`DaqError::SafetyLimit`] if the point is outside the stage limits,
    /// [`DaqError::Parameter`] for an empty name.
    pub fn save(&self, request: NewPosition) -> AppResult<SavedPosition> {
        require_name(&request.name)?;
        self.limits.validate_position(&request.position)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let saved = SavedPosition {
            id,
            name: request.name,
            description: request.description,
            position: request.position,
            camera_settings: request.camera_settings,
            created_at: Utc::now(),
        };
        self.positions.insert(id, saved.clone());
        info!(position_id = id, name = %saved.name, "Position saved");
        Ok(saved)
    }

    /// Fetch one position.
    pub fn get(&self, id: PositionId) -> AppResult<SavedPosition> {
        self.positions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(DaqError::PositionNotFound(id))
    }

    /// All positions, newest first.
    pub fn list(&self) -> Vec<SavedPosition> {
        let mut positions: Vec<SavedPosition> = self
            .positions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        positions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        positions
    }

    /// Apply `edit`, re-validating the merged coordinates first.
    ///
    /// On error the stored entry is left unchanged.
    pub fn update(&self, id: PositionId, edit: PositionEdit) -> AppResult<SavedPosition> {
        let mut entry = self
            .positions
            .get_mut(&id)
            .ok_or(DaqError::PositionNotFound(id))?;

        let current = entry.position;
        let position = Position::new(
            edit.x.unwrap_or(current.x),
            edit.y.unwrap_or(current.y),
            edit.z.unwrap_or(current.z),
        );
        self.limits.validate_position(&position)?;
        if let Some(name) = &edit.name {
            require_name(name)?;
        }

        let saved = entry.value_mut();
        saved.position = position;
        if let Some(name) = edit.name {
            saved.name = name;
        }
        if let Some(description) = edit.description {
            saved.description = Some(description);
        }
        if let Some(settings) = edit.camera_settings {
            saved.camera_settings = Some(settings);
        }
        info!(position_id = id, "Position updated");
        Ok(saved.clone())
    }

    /// Remove a position.
    pub fn delete(&self, id: PositionId) -> AppResult<SavedPosition> {
        let (_, removed) = self
            .positions
            .remove(&id)
            .ok_or(DaqError::PositionNotFound(id))?;
        info!(position_id = id, "Position deleted");
        Ok(removed)
    }

    /// Move the stage to a saved position.
    pub async fn goto(&self, id: PositionId, device: &dyn DeviceFacade) -> AppResult<Position> {
        let saved = self.get(id)?;
        info!(position_id = id, name = %saved.name, "Moving to saved position");
        device
            .move_to(TargetPosition::from(saved.position), false)
            .await
    }

    /// Number of saved positions.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the library is empty.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

fn require_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(DaqError::Parameter("position name must not be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_core::{Axis, AxisLimits};
    use daq_hardware::{Instrument, MockCamera, MockStage};

    fn store() -> PositionStore {
        PositionStore::new(StageLimits::default())
    }

    #[test]
    fn test_save_and_list_newest_first() {
        let store = store();
        let a = store
            .save(NewPosition::new("origin", Position::default()))
            .unwrap();
        let b = store
            .save(
                NewPosition::new("well A1", Position::new(1200.0, 800.0, 40.0))
                    .with_description("slide 3"),
            )
            .unwrap();

        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(store.get(2).unwrap().description.as_deref(), Some("slide 3"));
        let ids: Vec<_> = store.list().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn test_out_of_bounds_save_rejected() {
        let store = store();
        let err = store
            .save(NewPosition::new("too far", Position::new(100.0, 100.0, 6000.0)))
            .unwrap_err();
        match err {
            DaqError::SafetyLimit(violation) => assert_eq!(violation.axis, Axis::Z),
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_validates_merged_position() {
        let store = PositionStore::new(StageLimits {
            x: AxisLimits::new(0.0, 500.0),
            ..StageLimits::default()
        });
        let saved = store
            .save(NewPosition::new("corner", Position::new(400.0, 10.0, 0.0)))
            .unwrap();

        let err = store
            .update(
                saved.id,
                PositionEdit {
                    name: Some("renamed".into()),
                    x: Some(600.0),
                    ..PositionEdit::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, DaqError::SafetyLimit(_)));
        assert_eq!(store.get(saved.id).unwrap(), saved);

        let updated = store
            .update(
                saved.id,
                PositionEdit {
                    y: Some(20.0),
                    ..PositionEdit::default()
                },
            )
            .unwrap();
        assert_eq!(updated.position, Position::new(400.0, 20.0, 0.0));
        assert_eq!(updated.name, "corner");
    }

    #[test]
    fn test_missing_position() {
        let store = store();
        assert!(matches!(store.get(7), Err(DaqError::PositionNotFound(7))));
        assert!(store.update(7, PositionEdit::default()).is_err());
        assert!(store.delete(7).is_err());
        assert!(store.save(NewPosition::new("  ", Position::default())).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_goto_moves_stage() {
        let store = store();
        let saved = store
            .save(NewPosition::new("focus", Position::new(250.0, 300.0, 12.5)))
            .unwrap();
        let instrument = Instrument::new(
            MockStage::new(),
            MockCamera::default(),
            StageLimits::default(),
        );

        let reached = store.goto(saved.id, &instrument).await.unwrap();

        assert_eq!(reached, saved.position);
        assert_eq!(instrument.stage().history(), vec![saved.position]);

        store.delete(saved.id).unwrap();
        assert!(matches!(
            store.goto(saved.id, &instrument).await,
            Err(DaqError::PositionNotFound(_))
        ));
    }
}
