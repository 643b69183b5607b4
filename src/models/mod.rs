pub mod pagination;
pub mod participant_notes;
pub mod participants;
pub mod permissions;
pub mod recruitment_lists;
pub mod research_data;
pub mod sync_infos;
