mod data_sync;
mod helpers;
mod maintenance;
mod participant_infos;
mod participant_sync;
mod routes;
mod study_client;
