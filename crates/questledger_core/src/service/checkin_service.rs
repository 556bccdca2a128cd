//! Check-in code resolution.
//!
//! A presented code either completes the matching active check-in quest or
//! falls back to the org's flat check-in reward. Every call leaves exactly
//! one `checkin` audit entry, even when nothing is awarded.

use crate::model::audit::{AuditDraft, AuditEventType, XpContext};
use crate::model::player::PlayerKey;
use crate::repo::LedgerStore;
use crate::service::clock::Clock;
use crate::service::error::LedgerError;
use crate::service::ledger_service::{stage_xp_change, LedgerService};
use log::info;
use serde::{Deserialize, Serialize};

/// Which rule produced a check-in result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckinSource {
    QuestCheckin,
    ConfigCheckin,
    None,
}

impl CheckinSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QuestCheckin => "quest_checkin",
            Self::ConfigCheckin => "config_checkin",
            Self::None => "none",
        }
    }
}

/// Result of `checkin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinResult {
    pub quest_id: Option<String>,
    pub xp_awarded: i64,
    pub source: CheckinSource,
}

impl<S: LedgerStore, C: Clock> LedgerService<S, C> {
    /// Resolves `code` for an existing player.
    pub fn checkin(&mut self, key: &PlayerKey, code: &str) -> Result<CheckinResult, LedgerError> {
        let week = self.current_week();
        self.reconcile_pending(key, &week)?;
        // Fail before any write when the player has never been read.
        self.load_player(key)?;

        let matched = self.store.find_active_checkin_quest(&key.org_id, code)?;
        let result = if let Some(quest) = matched {
            let source = CheckinSource::QuestCheckin;
            let xp_awarded = self
                .complete_loaded_quest(key, &quest, source.as_str(), &week)?
                .unwrap_or(0);
            self.store.append_entry(
                key,
                &AuditDraft::lifecycle(AuditEventType::Checkin, source.as_str())
                    .with_quest(quest.id.as_str())
                    .with_xp_change(xp_awarded),
            )?;
            CheckinResult {
                quest_id: Some(quest.id),
                xp_awarded,
                source,
            }
        } else {
            let settings = self.store.org_settings(&key.org_id)?;
            let (source, xp_awarded) = if settings.xp_per_checkin > 0 {
                (CheckinSource::ConfigCheckin, settings.xp_per_checkin)
            } else {
                (CheckinSource::None, 0)
            };
            // The flat reward and its checkin entry commit together.
            let ctx = XpContext::new(source.as_str());
            self.store
                .with_transaction(key, |write| -> Result<(), LedgerError> {
                    if xp_awarded > 0 {
                        stage_xp_change(write, xp_awarded, &ctx, &week);
                    }
                    write.append_audit(
                        AuditDraft::lifecycle(AuditEventType::Checkin, source.as_str())
                            .with_xp_change(xp_awarded),
                    );
                    Ok(())
                })?;
            CheckinResult {
                quest_id: None,
                xp_awarded,
                source,
            }
        };

        info!(
            "event=checkin module=checkin status=ok org_id={} user_id={} source={} xp={}",
            key.org_id,
            key.user_id,
            result.source.as_str(),
            result.xp_awarded
        );
        Ok(result)
    }
}
