use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use recruitment_lists::core::{
    get_subscriber, init_subscriber, NotificationError, NotificationSender,
};
use recruitment_lists::db::{InMemoryRecruitmentListDb, RecruitmentListStore};
use recruitment_lists::models::recruitment_lists::{
    InclusionAutoConfig, InclusionType, ParticipantInclusion, RecruitmentList,
};
use recruitment_lists::study::{
    InMemoryStudyService, ResponseItem, SlotType, StudyParticipant, SurveyItemDef,
    SurveyItemResponse, SurveyResponse, SurveyVersion, ResponseSlotDef,
    PARTICIPANT_STUDY_STATUS_ACTIVE,
};
use recruitment_lists::sync::{SyncService, SyncSettings};

pub const STUDY_KEY: &str = "covid";
pub const GLOBAL_SECRET: &str = "global-secret";

// Ensure that the `tracing` stack is only initialised once using `once_cell`
static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        let _ = init_subscriber(subscriber);
    } else {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::sink);
        let _ = init_subscriber(subscriber);
    };
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SentNotification>>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send(
        &self,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(SentNotification {
            recipients: recipients.to_vec(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

pub struct TestApp {
    pub db: Arc<InMemoryRecruitmentListDb>,
    pub study: InMemoryStudyService,
    pub notifier: RecordingNotifier,
    pub service: SyncService,
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(SyncSettings::default())
}

pub fn spawn_app_with(settings: SyncSettings) -> TestApp {
    Lazy::force(&TRACING);

    let db = Arc::new(InMemoryRecruitmentListDb::new());
    let study = InMemoryStudyService::new(GLOBAL_SECRET);
    let notifier = RecordingNotifier::default();
    let service = SyncService::new(
        db.clone(),
        Arc::new(study.clone()),
        Arc::new(notifier.clone()),
        settings,
    );

    TestApp {
        db,
        study,
        notifier,
        service,
    }
}

impl TestApp {
    pub async fn store_list(&self, list: RecruitmentList) -> RecruitmentList {
        self.db
            .create_recruitment_list(list, "researcher-1")
            .await
            .unwrap()
    }
}

pub fn auto_list(name: &str) -> RecruitmentList {
    RecruitmentList::new(
        name,
        ParticipantInclusion {
            study_key: STUDY_KEY.to_string(),
            inclusion_type: InclusionType::Auto,
            auto_config: Some(InclusionAutoConfig::default()),
            notification_emails: vec!["team@example.org".to_string()],
        },
    )
}

pub fn manual_list(name: &str) -> RecruitmentList {
    RecruitmentList::new(
        name,
        ParticipantInclusion {
            study_key: STUDY_KEY.to_string(),
            inclusion_type: InclusionType::Manual,
            auto_config: None,
            notification_emails: vec!["team@example.org".to_string()],
        },
    )
}

pub fn study_participant(pid: &str, status: &str) -> StudyParticipant {
    StudyParticipant {
        participant_id: pid.to_string(),
        study_status: status.to_string(),
        entered_at: 1_700_000_000,
        flags: BTreeMap::new(),
        last_submissions: BTreeMap::new(),
    }
}

pub fn active_participant(pid: &str) -> StudyParticipant {
    study_participant(pid, PARTICIPANT_STUDY_STATUS_ACTIVE)
}

pub fn item(key: &str, value: &str, items: Vec<ResponseItem>) -> ResponseItem {
    ResponseItem {
        key: key.to_string(),
        value: value.to_string(),
        dtype: String::new(),
        items,
    }
}

/// One version with a single choice question `{survey}.q1`.
pub fn single_choice_version(survey_key: &str) -> SurveyVersion {
    SurveyVersion {
        version_id: "v1".to_string(),
        published: 1,
        unpublished: 0,
        items: vec![SurveyItemDef {
            key: format!("{}.q1", survey_key),
            slots: vec![ResponseSlotDef {
                id: "rg.scg".to_string(),
                slot_type: SlotType::SingleChoice,
                options: vec![],
            }],
        }],
    }
}

/// A response selecting `option` for `{survey}.q1`.
pub fn single_choice_response(
    id: &str,
    survey_key: &str,
    pid: &str,
    option: &str,
    arrived_at: i64,
) -> SurveyResponse {
    SurveyResponse {
        id: id.to_string(),
        key: survey_key.to_string(),
        participant_id: pid.to_string(),
        version_id: "v1".to_string(),
        opened_at: arrived_at - 60,
        submitted_at: arrived_at - 5,
        arrived_at,
        responses: vec![SurveyItemResponse {
            key: format!("{}.q1", survey_key),
            response: Some(item(
                "rg",
                "",
                vec![item("scg", "", vec![item(option, "", vec![])])],
            )),
        }],
        context: BTreeMap::new(),
    }
}
