use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::db::{
    DbError, ParticipantNoteStore, ParticipantStore, PermissionStore, RecruitmentListStore,
    ResearchDataStore, SyncInfoStore,
};
use crate::models::pagination::{prep_pagination_infos, PaginationInfos};
use crate::models::participant_notes::{ParticipantNote, SYSTEM_AUTHOR};
use crate::models::participants::{
    Participant, ParticipantFilter, ParticipantInfos, ParticipantSort, ParticipantSortField,
    SortOrder,
};
use crate::models::permissions::Permission;
use crate::models::recruitment_lists::{
    RecruitmentList, RecruitmentListFilter, RecruitmentListInfo, StudyAction,
};
use crate::models::research_data::{ResearchDataFilter, ResponseData, ResponseDataInfo};
use crate::models::sync_infos::{SyncInfo, SyncStatus};

#[derive(Default)]
struct Tables {
    recruitment_lists: Vec<RecruitmentList>,
    // insertion order doubles as storage order
    participants: Vec<Participant>,
    research_data: Vec<ResponseData>,
    sync_infos: HashMap<Uuid, SyncInfo>,
    notes: Vec<ParticipantNote>,
    permissions: Vec<Permission>,
}

/// Process local storage with the same semantics as the Postgres store.
/// Used by tests and for running the service without a database.
#[derive(Default)]
pub struct InMemoryRecruitmentListDb {
    tables: Mutex<Tables>,
    fail_research_data_writes: AtomicBool,
}

impl InMemoryRecruitmentListDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes every following research data write fail.
    pub fn fail_research_data_writes(&self, fail: bool) {
        self.fail_research_data_writes.store(fail, Ordering::SeqCst);
    }

    pub fn all_participants(&self, list_id: Uuid) -> Vec<Participant> {
        self.tables()
            .participants
            .iter()
            .filter(|p| p.recruitment_list_id == list_id)
            .cloned()
            .collect()
    }

    pub fn all_research_data(&self, list_id: Uuid) -> Vec<ResponseData> {
        self.tables()
            .research_data
            .iter()
            .filter(|r| r.recruitment_list_id == list_id)
            .cloned()
            .collect()
    }

    pub fn all_notes(&self, list_id: Uuid) -> Vec<ParticipantNote> {
        self.tables()
            .notes
            .iter()
            .filter(|n| n.recruitment_list_id == list_id)
            .cloned()
            .collect()
    }

    /// Writes a sync record as is, for setting up test scenarios.
    pub fn put_sync_info(&self, sync_info: SyncInfo) {
        self.tables()
            .sync_infos
            .insert(sync_info.recruitment_list_id, sync_info);
    }

    /// Writes a participant as is, for setting up test scenarios.
    pub fn put_participant(&self, participant: Participant) {
        self.tables().participants.push(participant);
    }
}

fn not_found_list(id: Uuid) -> DbError {
    DbError::NotFound(format!("recruitment list {}", id))
}

#[async_trait]
impl RecruitmentListStore for InMemoryRecruitmentListDb {
    async fn create_recruitment_list(
        &self,
        mut list: RecruitmentList,
        created_by: &str,
    ) -> Result<RecruitmentList, DbError> {
        list.created_at = Utc::now();
        list.created_by = created_by.to_string();

        let mut tables = self.tables();
        if tables.recruitment_lists.iter().any(|l| l.id == list.id) {
            return Err(DbError::Conflict(format!("recruitment list {} exists", list.id)));
        }
        tables.recruitment_lists.push(list.clone());
        Ok(list)
    }

    async fn get_recruitment_list(&self, id: Uuid) -> Result<RecruitmentList, DbError> {
        self.tables()
            .recruitment_lists
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(|| not_found_list(id))
    }

    async fn save_recruitment_list(&self, list: &RecruitmentList) -> Result<(), DbError> {
        let mut tables = self.tables();
        let stored = tables
            .recruitment_lists
            .iter_mut()
            .find(|l| l.id == list.id)
            .ok_or_else(|| not_found_list(list.id))?;
        *stored = list.clone();
        Ok(())
    }

    async fn update_recruitment_list_tags(&self, id: Uuid, tags: &[String]) -> Result<(), DbError> {
        let mut tables = self.tables();
        let stored = tables
            .recruitment_lists
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| not_found_list(id))?;
        stored.tags = tags.to_vec();
        Ok(())
    }

    async fn update_recruitment_list_study_actions(
        &self,
        id: Uuid,
        study_actions: &[StudyAction],
    ) -> Result<(), DbError> {
        let mut tables = self.tables();
        let stored = tables
            .recruitment_lists
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| not_found_list(id))?;
        stored.study_actions = study_actions.to_vec();
        Ok(())
    }

    async fn get_recruitment_list_infos(&self) -> Result<Vec<RecruitmentListInfo>, DbError> {
        Ok(self
            .tables()
            .recruitment_lists
            .iter()
            .map(|l| RecruitmentListInfo {
                id: l.id,
                name: l.name.clone(),
                description: l.description.clone(),
                tags: l.tags.clone(),
                created_at: l.created_at,
            })
            .collect())
    }

    async fn find_recruitment_lists(
        &self,
        filter: &RecruitmentListFilter,
    ) -> Result<Vec<RecruitmentList>, DbError> {
        Ok(self
            .tables()
            .recruitment_lists
            .iter()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect())
    }

    async fn delete_recruitment_list(&self, id: Uuid) -> Result<(), DbError> {
        let mut tables = self.tables();
        let before = tables.recruitment_lists.len();
        tables.recruitment_lists.retain(|l| l.id != id);
        if tables.recruitment_lists.len() == before {
            return Err(not_found_list(id));
        }
        Ok(())
    }
}

fn compare_participants(a: &Participant, b: &Participant, sort: ParticipantSort) -> std::cmp::Ordering {
    let ordering = match sort.field {
        ParticipantSortField::IncludedAt => a.included_at.cmp(&b.included_at),
        ParticipantSortField::ParticipantId => a.participant_id.cmp(&b.participant_id),
        ParticipantSortField::RecruitmentStatus => a.recruitment_status.cmp(&b.recruitment_status),
        ParticipantSortField::DeletedAt => a.deleted_at.cmp(&b.deleted_at),
    };
    match sort.order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

#[async_trait]
impl ParticipantStore for InMemoryRecruitmentListDb {
    async fn participant_exists(
        &self,
        participant_id: &str,
        list_id: Uuid,
    ) -> Result<bool, DbError> {
        Ok(self
            .tables()
            .participants
            .iter()
            .any(|p| p.participant_id == participant_id && p.recruitment_list_id == list_id))
    }

    async fn create_participant(
        &self,
        participant_id: &str,
        list_id: Uuid,
        included_by: &str,
    ) -> Result<Participant, DbError> {
        let mut tables = self.tables();
        if tables
            .participants
            .iter()
            .any(|p| p.participant_id == participant_id && p.recruitment_list_id == list_id)
        {
            return Err(DbError::Conflict(format!(
                "participant {} is already in list {}",
                participant_id, list_id
            )));
        }
        let participant = Participant::new(participant_id, list_id, included_by);
        tables.participants.push(participant.clone());
        Ok(participant)
    }

    async fn get_participant(&self, id: Uuid, list_id: Uuid) -> Result<Participant, DbError> {
        self.tables()
            .participants
            .iter()
            .find(|p| p.id == id && p.recruitment_list_id == list_id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("participant {}", id)))
    }

    async fn update_participant_status(
        &self,
        id: Uuid,
        list_id: Uuid,
        status: &str,
    ) -> Result<(), DbError> {
        let mut tables = self.tables();
        let participant = tables
            .participants
            .iter_mut()
            .find(|p| p.id == id && p.recruitment_list_id == list_id)
            .ok_or_else(|| DbError::NotFound(format!("participant {}", id)))?;
        participant.recruitment_status = status.to_string();
        Ok(())
    }

    async fn update_participant_infos(
        &self,
        participant_id: &str,
        list_id: Uuid,
        infos: &ParticipantInfos,
    ) -> Result<(), DbError> {
        let mut tables = self.tables();
        if let Some(participant) = tables
            .participants
            .iter_mut()
            .find(|p| p.participant_id == participant_id && p.recruitment_list_id == list_id)
        {
            participant.infos = infos.clone();
        }
        Ok(())
    }

    async fn mark_participant_deleted(
        &self,
        participant: &Participant,
        reason: &str,
    ) -> Result<(), DbError> {
        let list_id = participant.recruitment_list_id;
        let mut tables = self.tables();

        if let Some(stored) = tables.participants.iter_mut().find(|p| {
            p.participant_id == participant.participant_id && p.recruitment_list_id == list_id
        }) {
            stored.deleted_at = Some(Utc::now());
            stored.infos.clear();
        }

        tables.research_data.retain(|r| {
            !(r.participant_id == participant.participant_id && r.recruitment_list_id == list_id)
        });

        tables.notes.push(ParticipantNote {
            id: Uuid::new_v4(),
            pid: participant.id,
            recruitment_list_id: list_id,
            note: format!("Participant deleted: {}", reason),
            created_at: Utc::now(),
            created_by_id: String::new(),
            created_by: SYSTEM_AUTHOR.to_string(),
        });
        Ok(())
    }

    fn stream_participants(&self, list_id: Uuid) -> BoxStream<'static, Result<Participant, DbError>> {
        let snapshot: Vec<Result<Participant, DbError>> = self
            .all_participants(list_id)
            .into_iter()
            .map(Ok)
            .collect();
        stream::iter(snapshot).boxed()
    }

    async fn delete_participants_by_list(&self, list_id: Uuid) -> Result<(), DbError> {
        self.tables()
            .participants
            .retain(|p| p.recruitment_list_id != list_id);
        Ok(())
    }

    async fn count_participants(&self, list_id: Uuid) -> Result<i64, DbError> {
        Ok(self
            .tables()
            .participants
            .iter()
            .filter(|p| p.recruitment_list_id == list_id)
            .count() as i64)
    }

    async fn get_participants_page(
        &self,
        list_id: Uuid,
        page: i64,
        limit: i64,
        filter: &ParticipantFilter,
        sort: ParticipantSort,
    ) -> Result<(Vec<Participant>, PaginationInfos), DbError> {
        let mut matching: Vec<Participant> = self
            .all_participants(list_id)
            .into_iter()
            .filter(|p| filter.matches(p))
            .collect();
        // stable sort keeps storage order for ties
        matching.sort_by(|a, b| compare_participants(a, b, sort));

        let pagination = prep_pagination_infos(matching.len() as i64, page, limit);
        let participants = matching
            .into_iter()
            .skip(pagination.offset().max(0) as usize)
            .take(pagination.page_size as usize)
            .collect();
        Ok((participants, pagination))
    }
}

#[async_trait]
impl ResearchDataStore for InMemoryRecruitmentListDb {
    async fn save_research_data(&self, data: &[ResponseData]) -> Result<u64, DbError> {
        if self.fail_research_data_writes.load(Ordering::SeqCst) {
            return Err(DbError::Sqlx(sqlx::Error::PoolClosed));
        }

        let mut tables = self.tables();
        let mut inserted = 0;
        for item in data {
            let duplicate = tables.research_data.iter().any(|r| {
                r.participant_id == item.participant_id
                    && r.response_id == item.response_id
                    && r.recruitment_list_id == item.recruitment_list_id
            });
            if !duplicate {
                tables.research_data.push(item.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn delete_research_data_by_list(&self, list_id: Uuid) -> Result<(), DbError> {
        self.tables()
            .research_data
            .retain(|r| r.recruitment_list_id != list_id);
        Ok(())
    }

    async fn get_available_response_infos(
        &self,
        list_id: Uuid,
        filter: &ResearchDataFilter,
    ) -> Result<Vec<ResponseDataInfo>, DbError> {
        let mut infos: BTreeMap<String, ResponseDataInfo> = BTreeMap::new();
        for data in self
            .all_research_data(list_id)
            .iter()
            .filter(|r| filter.matches(r))
        {
            infos
                .entry(data.survey_key.clone())
                .and_modify(|info| {
                    info.count += 1;
                    info.first_arrived_at = info.first_arrived_at.min(data.arrived_at);
                    info.last_arrived_at = info.last_arrived_at.max(data.arrived_at);
                })
                .or_insert_with(|| ResponseDataInfo {
                    survey_key: data.survey_key.clone(),
                    count: 1,
                    first_arrived_at: data.arrived_at,
                    last_arrived_at: data.arrived_at,
                });
        }
        Ok(infos.into_values().collect())
    }

    fn stream_research_data(
        &self,
        list_id: Uuid,
        filter: ResearchDataFilter,
    ) -> BoxStream<'static, Result<ResponseData, DbError>> {
        let snapshot: Vec<Result<ResponseData, DbError>> = self
            .all_research_data(list_id)
            .into_iter()
            .filter(|r| filter.matches(r))
            .map(Ok)
            .collect();
        stream::iter(snapshot).boxed()
    }
}

#[async_trait]
impl SyncInfoStore for InMemoryRecruitmentListDb {
    async fn get_sync_info(&self, list_id: Uuid) -> Result<Option<SyncInfo>, DbError> {
        Ok(self.tables().sync_infos.get(&list_id).cloned())
    }

    async fn start_participant_sync(&self, list_id: Uuid) -> Result<(), DbError> {
        let mut tables = self.tables();
        let info = tables
            .sync_infos
            .entry(list_id)
            .or_insert_with(|| SyncInfo::empty(list_id));
        info.participant_sync_status = SyncStatus::Running;
        info.participant_sync_started_at = Some(Utc::now());
        Ok(())
    }

    async fn finish_participant_sync(&self, list_id: Uuid) -> Result<(), DbError> {
        if let Some(info) = self.tables().sync_infos.get_mut(&list_id) {
            info.participant_sync_status = SyncStatus::Idle;
        }
        Ok(())
    }

    async fn reset_participant_sync(&self, list_id: Uuid) -> Result<(), DbError> {
        if let Some(info) = self.tables().sync_infos.get_mut(&list_id) {
            info.participant_sync_status = SyncStatus::Idle;
            info.participant_sync_started_at = None;
        }
        Ok(())
    }

    async fn start_data_sync(&self, list_id: Uuid) -> Result<(), DbError> {
        let mut tables = self.tables();
        let info = tables
            .sync_infos
            .entry(list_id)
            .or_insert_with(|| SyncInfo::empty(list_id));
        info.data_sync_status = SyncStatus::Running;
        info.data_sync_started_at = Some(Utc::now());
        Ok(())
    }

    async fn finish_data_sync(&self, list_id: Uuid) -> Result<(), DbError> {
        if let Some(info) = self.tables().sync_infos.get_mut(&list_id) {
            info.data_sync_status = SyncStatus::Idle;
        }
        Ok(())
    }

    async fn reset_data_sync(&self, list_id: Uuid) -> Result<(), DbError> {
        if let Some(info) = self.tables().sync_infos.get_mut(&list_id) {
            info.data_sync_status = SyncStatus::Idle;
            info.data_sync_started_at = None;
        }
        Ok(())
    }

    async fn delete_sync_infos(&self, list_id: Uuid) -> Result<(), DbError> {
        self.tables().sync_infos.remove(&list_id);
        Ok(())
    }
}

#[async_trait]
impl ParticipantNoteStore for InMemoryRecruitmentListDb {
    async fn create_participant_note(
        &self,
        pid: Uuid,
        list_id: Uuid,
        note: &str,
        created_by_id: &str,
        created_by: &str,
    ) -> Result<ParticipantNote, DbError> {
        let participant_note = ParticipantNote {
            id: Uuid::new_v4(),
            pid,
            recruitment_list_id: list_id,
            note: note.to_string(),
            created_at: Utc::now(),
            created_by_id: created_by_id.to_string(),
            created_by: created_by.to_string(),
        };
        self.tables().notes.push(participant_note.clone());
        Ok(participant_note)
    }

    async fn get_participant_notes(
        &self,
        pid: Uuid,
        list_id: Uuid,
    ) -> Result<Vec<ParticipantNote>, DbError> {
        Ok(self
            .tables()
            .notes
            .iter()
            .filter(|n| n.pid == pid && n.recruitment_list_id == list_id)
            .cloned()
            .collect())
    }

    async fn delete_participant_notes_by_list(&self, list_id: Uuid) -> Result<(), DbError> {
        self.tables()
            .notes
            .retain(|n| n.recruitment_list_id != list_id);
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for InMemoryRecruitmentListDb {
    async fn create_permission(
        &self,
        user_id: &str,
        action: &str,
        resource_id: &str,
        created_by: &str,
        limiter: Vec<BTreeMap<String, String>>,
    ) -> Result<Permission, DbError> {
        let permission = Permission {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            resource_id: resource_id.to_string(),
            action: action.to_string(),
            limiter,
            created_at: Utc::now(),
            created_by: created_by.to_string(),
        };
        self.tables().permissions.push(permission.clone());
        Ok(permission)
    }

    async fn get_permissions_by_user(&self, user_id: &str) -> Result<Vec<Permission>, DbError> {
        Ok(self
            .tables()
            .permissions
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_permissions_by_resource(
        &self,
        resource_id: &str,
    ) -> Result<Vec<Permission>, DbError> {
        Ok(self
            .tables()
            .permissions
            .iter()
            .filter(|p| p.resource_id == resource_id)
            .cloned()
            .collect())
    }

    async fn get_specific_permissions(
        &self,
        user_id: &str,
        actions: &[&str],
        resources: &[&str],
    ) -> Result<Vec<Permission>, DbError> {
        Ok(self
            .tables()
            .permissions
            .iter()
            .filter(|p| p.user_id == user_id)
            .filter(|p| actions.is_empty() || actions.contains(&p.action.as_str()))
            .filter(|p| resources.is_empty() || resources.contains(&p.resource_id.as_str()))
            .cloned()
            .collect())
    }

    async fn delete_permission(&self, id: Uuid) -> Result<(), DbError> {
        self.tables().permissions.retain(|p| p.id != id);
        Ok(())
    }

    async fn delete_permissions_by_resource(&self, resource_id: &str) -> Result<(), DbError> {
        self.tables()
            .permissions
            .retain(|p| p.resource_id != resource_id);
        Ok(())
    }
}
