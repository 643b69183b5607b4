use async_trait::async_trait;
use futures_util::stream::BoxStream;
use sqlx::PgPool;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::pagination::PaginationInfos;
use crate::models::participant_notes::ParticipantNote;
use crate::models::participants::{Participant, ParticipantFilter, ParticipantInfos, ParticipantSort};
use crate::models::permissions::Permission;
use crate::models::recruitment_lists::{
    RecruitmentList, RecruitmentListFilter, RecruitmentListInfo, StudyAction,
};
use crate::models::research_data::{ResearchDataFilter, ResponseData, ResponseDataInfo};
use crate::models::sync_infos::SyncInfo;

pub mod memory;
pub mod participant_notes;
pub mod participants;
pub mod permissions;
pub mod recruitment_lists;
pub mod research_data;
pub mod sync_infos;

pub use memory::InMemoryRecruitmentListDb;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("could not encode stored document: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait RecruitmentListStore: Send + Sync {
    async fn create_recruitment_list(
        &self,
        list: RecruitmentList,
        created_by: &str,
    ) -> Result<RecruitmentList, DbError>;
    async fn get_recruitment_list(&self, id: Uuid) -> Result<RecruitmentList, DbError>;
    /// Replaces the stored document.
    async fn save_recruitment_list(&self, list: &RecruitmentList) -> Result<(), DbError>;
    async fn update_recruitment_list_tags(&self, id: Uuid, tags: &[String]) -> Result<(), DbError>;
    async fn update_recruitment_list_study_actions(
        &self,
        id: Uuid,
        study_actions: &[StudyAction],
    ) -> Result<(), DbError>;
    async fn get_recruitment_list_infos(&self) -> Result<Vec<RecruitmentListInfo>, DbError>;
    async fn find_recruitment_lists(
        &self,
        filter: &RecruitmentListFilter,
    ) -> Result<Vec<RecruitmentList>, DbError>;
    async fn delete_recruitment_list(&self, id: Uuid) -> Result<(), DbError>;
}

#[async_trait]
pub trait ParticipantStore: Send + Sync {
    async fn participant_exists(&self, participant_id: &str, list_id: Uuid)
        -> Result<bool, DbError>;
    /// Fails with `DbError::Conflict` if the participant is already a member.
    async fn create_participant(
        &self,
        participant_id: &str,
        list_id: Uuid,
        included_by: &str,
    ) -> Result<Participant, DbError>;
    async fn get_participant(&self, id: Uuid, list_id: Uuid) -> Result<Participant, DbError>;
    async fn update_participant_status(
        &self,
        id: Uuid,
        list_id: Uuid,
        status: &str,
    ) -> Result<(), DbError>;
    async fn update_participant_infos(
        &self,
        participant_id: &str,
        list_id: Uuid,
        infos: &ParticipantInfos,
    ) -> Result<(), DbError>;
    /// Soft delete: stamps `deleted_at`, clears the infos, drops the
    /// participant's research data and leaves a system note with `reason`.
    async fn mark_participant_deleted(
        &self,
        participant: &Participant,
        reason: &str,
    ) -> Result<(), DbError>;
    /// Members of a list in inclusion order.
    fn stream_participants(&self, list_id: Uuid) -> BoxStream<'static, Result<Participant, DbError>>;
    async fn delete_participants_by_list(&self, list_id: Uuid) -> Result<(), DbError>;
    async fn count_participants(&self, list_id: Uuid) -> Result<i64, DbError>;
    async fn get_participants_page(
        &self,
        list_id: Uuid,
        page: i64,
        limit: i64,
        filter: &ParticipantFilter,
        sort: ParticipantSort,
    ) -> Result<(Vec<Participant>, PaginationInfos), DbError>;
}

#[async_trait]
pub trait ResearchDataStore: Send + Sync {
    /// Bulk insert, rows already stored for the same participant and
    /// response are skipped. Returns the number of new rows.
    async fn save_research_data(&self, data: &[ResponseData]) -> Result<u64, DbError>;
    async fn delete_research_data_by_list(&self, list_id: Uuid) -> Result<(), DbError>;
    async fn get_available_response_infos(
        &self,
        list_id: Uuid,
        filter: &ResearchDataFilter,
    ) -> Result<Vec<ResponseDataInfo>, DbError>;
    fn stream_research_data(
        &self,
        list_id: Uuid,
        filter: ResearchDataFilter,
    ) -> BoxStream<'static, Result<ResponseData, DbError>>;
}

#[async_trait]
pub trait SyncInfoStore: Send + Sync {
    async fn get_sync_info(&self, list_id: Uuid) -> Result<Option<SyncInfo>, DbError>;
    async fn start_participant_sync(&self, list_id: Uuid) -> Result<(), DbError>;
    async fn finish_participant_sync(&self, list_id: Uuid) -> Result<(), DbError>;
    async fn reset_participant_sync(&self, list_id: Uuid) -> Result<(), DbError>;
    async fn start_data_sync(&self, list_id: Uuid) -> Result<(), DbError>;
    async fn finish_data_sync(&self, list_id: Uuid) -> Result<(), DbError>;
    async fn reset_data_sync(&self, list_id: Uuid) -> Result<(), DbError>;
    async fn delete_sync_infos(&self, list_id: Uuid) -> Result<(), DbError>;
}

#[async_trait]
pub trait ParticipantNoteStore: Send + Sync {
    async fn create_participant_note(
        &self,
        pid: Uuid,
        list_id: Uuid,
        note: &str,
        created_by_id: &str,
        created_by: &str,
    ) -> Result<ParticipantNote, DbError>;
    async fn get_participant_notes(
        &self,
        pid: Uuid,
        list_id: Uuid,
    ) -> Result<Vec<ParticipantNote>, DbError>;
    async fn delete_participant_notes_by_list(&self, list_id: Uuid) -> Result<(), DbError>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn create_permission(
        &self,
        user_id: &str,
        action: &str,
        resource_id: &str,
        created_by: &str,
        limiter: Vec<BTreeMap<String, String>>,
    ) -> Result<Permission, DbError>;
    async fn get_permissions_by_user(&self, user_id: &str) -> Result<Vec<Permission>, DbError>;
    async fn get_permissions_by_resource(
        &self,
        resource_id: &str,
    ) -> Result<Vec<Permission>, DbError>;
    /// Empty `actions` or `resources` do not constrain the lookup.
    async fn get_specific_permissions(
        &self,
        user_id: &str,
        actions: &[&str],
        resources: &[&str],
    ) -> Result<Vec<Permission>, DbError>;
    async fn delete_permission(&self, id: Uuid) -> Result<(), DbError>;
    async fn delete_permissions_by_resource(&self, resource_id: &str) -> Result<(), DbError>;
}

/// Everything the sync engine and the api need from storage.
pub trait RecruitmentListDb:
    RecruitmentListStore
    + ParticipantStore
    + ResearchDataStore
    + SyncInfoStore
    + ParticipantNoteStore
    + PermissionStore
{
    fn as_permission_store(&self) -> &dyn PermissionStore;
}

impl<T> RecruitmentListDb for T
where
    T: RecruitmentListStore
        + ParticipantStore
        + ResearchDataStore
        + SyncInfoStore
        + ParticipantNoteStore
        + PermissionStore,
{
    fn as_permission_store(&self) -> &dyn PermissionStore {
        self
    }
}

/// Postgres backed storage.
#[derive(Clone)]
pub struct PgRecruitmentListDb {
    pool: PgPool,
}

impl PgRecruitmentListDb {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecruitmentListStore for PgRecruitmentListDb {
    async fn create_recruitment_list(
        &self,
        list: RecruitmentList,
        created_by: &str,
    ) -> Result<RecruitmentList, DbError> {
        recruitment_lists::create_recruitment_list(&self.pool, list, created_by).await
    }

    async fn get_recruitment_list(&self, id: Uuid) -> Result<RecruitmentList, DbError> {
        recruitment_lists::get_recruitment_list_by_id(&self.pool, id).await
    }

    async fn save_recruitment_list(&self, list: &RecruitmentList) -> Result<(), DbError> {
        recruitment_lists::save_recruitment_list(&self.pool, list).await
    }

    async fn update_recruitment_list_tags(&self, id: Uuid, tags: &[String]) -> Result<(), DbError> {
        recruitment_lists::update_tags(&self.pool, id, tags).await
    }

    async fn update_recruitment_list_study_actions(
        &self,
        id: Uuid,
        study_actions: &[StudyAction],
    ) -> Result<(), DbError> {
        recruitment_lists::update_study_actions(&self.pool, id, study_actions).await
    }

    async fn get_recruitment_list_infos(&self) -> Result<Vec<RecruitmentListInfo>, DbError> {
        recruitment_lists::get_recruitment_list_infos(&self.pool).await
    }

    async fn find_recruitment_lists(
        &self,
        filter: &RecruitmentListFilter,
    ) -> Result<Vec<RecruitmentList>, DbError> {
        recruitment_lists::find_recruitment_lists(&self.pool, filter).await
    }

    async fn delete_recruitment_list(&self, id: Uuid) -> Result<(), DbError> {
        recruitment_lists::delete_recruitment_list(&self.pool, id).await
    }
}

#[async_trait]
impl ParticipantStore for PgRecruitmentListDb {
    async fn participant_exists(
        &self,
        participant_id: &str,
        list_id: Uuid,
    ) -> Result<bool, DbError> {
        participants::participant_exists(&self.pool, participant_id, list_id).await
    }

    async fn create_participant(
        &self,
        participant_id: &str,
        list_id: Uuid,
        included_by: &str,
    ) -> Result<Participant, DbError> {
        participants::create_participant(&self.pool, participant_id, list_id, included_by).await
    }

    async fn get_participant(&self, id: Uuid, list_id: Uuid) -> Result<Participant, DbError> {
        participants::get_participant_by_id(&self.pool, id, list_id).await
    }

    async fn update_participant_status(
        &self,
        id: Uuid,
        list_id: Uuid,
        status: &str,
    ) -> Result<(), DbError> {
        participants::update_participant_status(&self.pool, id, list_id, status).await
    }

    async fn update_participant_infos(
        &self,
        participant_id: &str,
        list_id: Uuid,
        infos: &ParticipantInfos,
    ) -> Result<(), DbError> {
        participants::update_participant_infos(&self.pool, participant_id, list_id, infos).await
    }

    async fn mark_participant_deleted(
        &self,
        participant: &Participant,
        reason: &str,
    ) -> Result<(), DbError> {
        participants::mark_participant_deleted(&self.pool, participant, reason).await
    }

    fn stream_participants(&self, list_id: Uuid) -> BoxStream<'static, Result<Participant, DbError>> {
        participants::stream_participants(self.pool.clone(), list_id)
    }

    async fn delete_participants_by_list(&self, list_id: Uuid) -> Result<(), DbError> {
        participants::delete_participants_by_list(&self.pool, list_id).await
    }

    async fn count_participants(&self, list_id: Uuid) -> Result<i64, DbError> {
        participants::count_participants(&self.pool, list_id).await
    }

    async fn get_participants_page(
        &self,
        list_id: Uuid,
        page: i64,
        limit: i64,
        filter: &ParticipantFilter,
        sort: ParticipantSort,
    ) -> Result<(Vec<Participant>, PaginationInfos), DbError> {
        participants::get_participants_page(&self.pool, list_id, page, limit, filter, sort).await
    }
}

#[async_trait]
impl ResearchDataStore for PgRecruitmentListDb {
    async fn save_research_data(&self, data: &[ResponseData]) -> Result<u64, DbError> {
        research_data::save_research_data(&self.pool, data).await
    }

    async fn delete_research_data_by_list(&self, list_id: Uuid) -> Result<(), DbError> {
        research_data::delete_research_data_by_list(&self.pool, list_id).await
    }

    async fn get_available_response_infos(
        &self,
        list_id: Uuid,
        filter: &ResearchDataFilter,
    ) -> Result<Vec<ResponseDataInfo>, DbError> {
        research_data::get_available_response_infos(&self.pool, list_id, filter).await
    }

    fn stream_research_data(
        &self,
        list_id: Uuid,
        filter: ResearchDataFilter,
    ) -> BoxStream<'static, Result<ResponseData, DbError>> {
        research_data::stream_research_data(self.pool.clone(), list_id, filter)
    }
}

#[async_trait]
impl SyncInfoStore for PgRecruitmentListDb {
    async fn get_sync_info(&self, list_id: Uuid) -> Result<Option<SyncInfo>, DbError> {
        sync_infos::get_sync_info(&self.pool, list_id).await
    }

    async fn start_participant_sync(&self, list_id: Uuid) -> Result<(), DbError> {
        sync_infos::start_participant_sync(&self.pool, list_id).await
    }

    async fn finish_participant_sync(&self, list_id: Uuid) -> Result<(), DbError> {
        sync_infos::finish_participant_sync(&self.pool, list_id).await
    }

    async fn reset_participant_sync(&self, list_id: Uuid) -> Result<(), DbError> {
        sync_infos::reset_participant_sync(&self.pool, list_id).await
    }

    async fn start_data_sync(&self, list_id: Uuid) -> Result<(), DbError> {
        sync_infos::start_data_sync(&self.pool, list_id).await
    }

    async fn finish_data_sync(&self, list_id: Uuid) -> Result<(), DbError> {
        sync_infos::finish_data_sync(&self.pool, list_id).await
    }

    async fn reset_data_sync(&self, list_id: Uuid) -> Result<(), DbError> {
        sync_infos::reset_data_sync(&self.pool, list_id).await
    }

    async fn delete_sync_infos(&self, list_id: Uuid) -> Result<(), DbError> {
        sync_infos::delete_sync_infos(&self.pool, list_id).await
    }
}

#[async_trait]
impl ParticipantNoteStore for PgRecruitmentListDb {
    async fn create_participant_note(
        &self,
        pid: Uuid,
        list_id: Uuid,
        note: &str,
        created_by_id: &str,
        created_by: &str,
    ) -> Result<ParticipantNote, DbError> {
        participant_notes::create_participant_note(
            &self.pool,
            pid,
            list_id,
            note,
            created_by_id,
            created_by,
        )
        .await
    }

    async fn get_participant_notes(
        &self,
        pid: Uuid,
        list_id: Uuid,
    ) -> Result<Vec<ParticipantNote>, DbError> {
        participant_notes::get_participant_notes(&self.pool, pid, list_id).await
    }

    async fn delete_participant_notes_by_list(&self, list_id: Uuid) -> Result<(), DbError> {
        participant_notes::delete_participant_notes_by_list(&self.pool, list_id).await
    }
}

#[async_trait]
impl PermissionStore for PgRecruitmentListDb {
    async fn create_permission(
        &self,
        user_id: &str,
        action: &str,
        resource_id: &str,
        created_by: &str,
        limiter: Vec<BTreeMap<String, String>>,
    ) -> Result<Permission, DbError> {
        permissions::create_permission(&self.pool, user_id, action, resource_id, created_by, limiter)
            .await
    }

    async fn get_permissions_by_user(&self, user_id: &str) -> Result<Vec<Permission>, DbError> {
        permissions::get_permissions_by_user(&self.pool, user_id).await
    }

    async fn get_permissions_by_resource(
        &self,
        resource_id: &str,
    ) -> Result<Vec<Permission>, DbError> {
        permissions::get_permissions_by_resource(&self.pool, resource_id).await
    }

    async fn get_specific_permissions(
        &self,
        user_id: &str,
        actions: &[&str],
        resources: &[&str],
    ) -> Result<Vec<Permission>, DbError> {
        permissions::get_specific_permissions(&self.pool, user_id, actions, resources).await
    }

    async fn delete_permission(&self, id: Uuid) -> Result<(), DbError> {
        permissions::delete_permission(&self.pool, id).await
    }

    async fn delete_permissions_by_resource(&self, resource_id: &str) -> Result<(), DbError> {
        permissions::delete_permissions_by_resource(&self.pool, resource_id).await
    }
}
