use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Locale for generated traffic and prompt templates. A scalar selection
/// only; it never changes control flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Ko,
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" => Ok(Locale::En),
            "ko" => Ok(Locale::Ko),
            other => Err(format!("unknown locale: {other}")),
        }
    }
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Ko => "ko",
        }
    }

    // --- static strings ----------------------------------------------------

    pub fn scheduled_communications(&self) -> &'static str {
        match self {
            Locale::En => "Scheduled communications",
            Locale::Ko => "예정된 커뮤니케이션",
        }
    }

    pub fn rest_and_recover(&self) -> &'static str {
        match self {
            Locale::En => "Rest and recover",
            Locale::Ko => "휴식 및 회복",
        }
    }

    pub fn rest_and_recover_body(&self) -> &'static str {
        match self {
            Locale::En => "You are on sick leave today. Hand off anything urgent and rest up.",
            Locale::Ko => "오늘은 병가입니다. 급한 일은 인계하고 푹 쉬세요.",
        }
    }

    pub fn rest_and_recover_action(&self) -> &'static str {
        match self {
            Locale::En => "Rest and reschedule today's tasks.",
            Locale::Ko => "휴식을 취하고 오늘 작업 일정을 조정하세요.",
        }
    }

    pub fn sick_leave_adjustment(&self) -> &'static str {
        match self {
            Locale::En => "Observe sick leave and hold work until recovered.",
            Locale::Ko => "병가를 준수하고 회복할 때까지 작업을 보류합니다.",
        }
    }

    pub fn pending_adjustment(&self) -> &'static str {
        match self {
            Locale::En => "Pending adjustment",
            Locale::Ko => "대기 중인 조정 사항",
        }
    }

    pub fn live_collaboration_adjustments(&self) -> &'static str {
        match self {
            Locale::En => "Live collaboration adjustments",
            Locale::Ko => "실시간 협업 조정 사항",
        }
    }

    pub fn your_latest_update(&self) -> &'static str {
        match self {
            Locale::En => "your latest update",
            Locale::Ko => "최근 업데이트",
        }
    }

    pub fn no_hourly_activities(&self) -> &'static str {
        match self {
            Locale::En => "No hourly activities were recorded.",
            Locale::Ko => "기록된 시간별 활동이 없습니다.",
        }
    }

    pub fn client_feature_requests(&self) -> &'static [&'static str] {
        match self {
            Locale::En => &[
                "export reports to CSV",
                "dark mode for the dashboard",
                "bulk-edit support",
                "weekly digest emails",
                "an audit trail for approvals",
            ],
            Locale::Ko => &[
                "보고서 CSV 내보내기",
                "대시보드 다크 모드",
                "일괄 편집 지원",
                "주간 요약 이메일",
                "승인 감사 로그",
            ],
        }
    }

    pub fn kickoff_chat(&self) -> &'static str {
        match self {
            Locale::En => "Morning! Quick sync on priorities?",
            Locale::Ko => "좋은 아침입니다! 오늘 우선순위 빠르게 맞춰볼까요?",
        }
    }

    pub fn kickoff_email(&self) -> &'static str {
        match self {
            Locale::En => "Kickoff | Lining up tasks for today — ping me with blockers.",
            Locale::Ko => "킥오프 | 오늘 진행할 작업 정리했습니다 — 문의사항 있으면 알려주세요.",
        }
    }

    // --- templates ----------------------------------------------------------

    pub fn coverage_needed(&self, name: &str) -> String {
        match self {
            Locale::En => format!("Coverage needed: {name} is out sick"),
            Locale::Ko => format!("커버 필요: {name}님이 병가 중입니다"),
        }
    }

    pub fn coverage_needed_body(&self, name: &str, tick: i64) -> String {
        match self {
            Locale::En => format!(
                "{name} went on sick leave at tick {tick}. Please arrange cover for their work today."
            ),
            Locale::Ko => format!(
                "{name}님이 틱 {tick}에 병가를 냈습니다. 오늘 업무 커버를 조율해 주세요."
            ),
        }
    }

    pub fn client_request_subject(&self, feature: &str) -> String {
        match self {
            Locale::En => format!("Client request: {feature}"),
            Locale::Ko => format!("고객 요청: {feature}"),
        }
    }

    pub fn client_request_body(&self, feature: &str) -> String {
        match self {
            Locale::En => format!("A client has asked for {feature}. Please scope it and respond."),
            Locale::Ko => format!("고객이 {feature}을(를) 요청했습니다. 범위를 파악하고 회신해 주세요."),
        }
    }

    pub fn client_request_action(&self, feature: &str) -> String {
        match self {
            Locale::En => format!("Scope the client request: {feature}."),
            Locale::Ko => format!("고객 요청 범위 산정: {feature}."),
        }
    }

    pub fn partner_with(&self, name: &str, feature: &str) -> String {
        match self {
            Locale::En => format!("{name} needs a partner on the client request: {feature}."),
            Locale::Ko => format!("{name}님이 고객 요청({feature}) 협업 파트너를 찾고 있습니다."),
        }
    }

    pub fn support_on(&self, name: &str, feature: &str) -> String {
        match self {
            Locale::En => format!("Support {name} on {feature}."),
            Locale::Ko => format!("{name}님의 {feature} 작업을 지원하세요."),
        }
    }

    pub fn update_generic(&self, name: &str) -> String {
        match self {
            Locale::En => format!("Update from {name}"),
            Locale::Ko => format!("{name}님의 업데이트"),
        }
    }

    pub fn update_for(&self, name: &str) -> String {
        match self {
            Locale::En => format!("Status update for {name}"),
            Locale::Ko => format!("{name}님을 위한 상태 업데이트"),
        }
    }

    pub fn update_from_to(&self, from: &str, to: &str) -> String {
        match self {
            Locale::En => format!("Update from {from} for {to}"),
            Locale::Ko => format!("{from}님이 {to}님께 드리는 업데이트"),
        }
    }

    pub fn acknowledgement_from(&self, name: &str) -> String {
        match self {
            Locale::En => format!("Acknowledgement from {name}"),
            Locale::Ko => format!("{name}님의 확인"),
        }
    }

    pub fn ack_from(&self, name: &str, summary: &str) -> String {
        match self {
            Locale::En => format!("Ack from {name}: {summary}"),
            Locale::Ko => format!("{name}님의 확인: {summary}"),
        }
    }

    pub fn handle_request_from(&self, name: &str, action_item: &str) -> String {
        match self {
            Locale::En => format!("Handle request from {name}: {action_item}"),
            Locale::Ko => format!("{name}님의 요청 처리: {action_item}"),
        }
    }

    /// Varied acknowledgement lines; the caller picks one.
    pub fn ack_patterns(&self, first_name: &str, phrase: &str) -> [String; 4] {
        match self {
            Locale::En => [
                format!("{first_name}, confirmed: {phrase}."),
                format!("{first_name}, on it — {phrase}."),
                format!("{first_name}, working through {phrase} now."),
                format!("Got it, {first_name}. Will handle {phrase}."),
            ],
            Locale::Ko => [
                format!("{first_name}님, {phrase} 확인했습니다."),
                format!("{first_name}님, {phrase} 진행하겠습니다."),
                format!("{first_name}님, {phrase} 작업 중입니다."),
                format!("{first_name}님, 알겠습니다. {phrase} 처리하겠습니다."),
            ],
        }
    }
}
