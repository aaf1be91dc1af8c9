use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    lead_flow(New)

    New(HydrateGatheringInfo) => GatheringInfo,
    New(HydrateQualified) => Qualified,
    New(HydrateDisqualified) => Disqualified,
    New(HydrateMeetingRequested) => MeetingRequested,
    New(HydratePendingConfirmation) => PendingConfirmation,
    New(HydrateMeetingConfirmed) => MeetingConfirmed,

    New(Gather) => GatheringInfo,
    New(Qualify) => Qualified,
    New(Disqualify) => Disqualified,

    GatheringInfo(Qualify) => Qualified,
    GatheringInfo(Disqualify) => Disqualified,
    GatheringInfo(RequestMeeting) => MeetingRequested,

    Qualified(RequestMeeting) => MeetingRequested,
    Qualified(AwaitConfirmation) => PendingConfirmation,
    Qualified(Disqualify) => Disqualified,

    Disqualified(Gather) => GatheringInfo,
    Disqualified(Qualify) => Qualified,

    MeetingRequested(AwaitConfirmation) => PendingConfirmation,
    MeetingRequested(Disqualify) => Disqualified,

    PendingConfirmation(ConfirmMeeting) => MeetingConfirmed,
    PendingConfirmation(RequestMeeting) => MeetingRequested
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,
    GatheringInfo,
    Qualified,
    Disqualified,
    MeetingRequested,
    PendingConfirmation,
    MeetingConfirmed,
}

impl LeadStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "new" => Some(Self::New),
            "gathering_info" => Some(Self::GatheringInfo),
            "qualified" => Some(Self::Qualified),
            "disqualified" => Some(Self::Disqualified),
            "meeting_requested" => Some(Self::MeetingRequested),
            "pending_confirmation" => Some(Self::PendingConfirmation),
            "meeting_confirmed" => Some(Self::MeetingConfirmed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::GatheringInfo => "gathering_info",
            Self::Qualified => "qualified",
            Self::Disqualified => "disqualified",
            Self::MeetingRequested => "meeting_requested",
            Self::PendingConfirmation => "pending_confirmation",
            Self::MeetingConfirmed => "meeting_confirmed",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn hydrate(machine: &mut lead_flow::StateMachine, state: LeadStatus) -> Result<(), ()> {
    let input = match state {
        LeadStatus::New => return Ok(()),
        LeadStatus::GatheringInfo => lead_flow::Input::HydrateGatheringInfo,
        LeadStatus::Qualified => lead_flow::Input::HydrateQualified,
        LeadStatus::Disqualified => lead_flow::Input::HydrateDisqualified,
        LeadStatus::MeetingRequested => lead_flow::Input::HydrateMeetingRequested,
        LeadStatus::PendingConfirmation => lead_flow::Input::HydratePendingConfirmation,
        LeadStatus::MeetingConfirmed => lead_flow::Input::HydrateMeetingConfirmed,
    };
    machine.consume(&input).map_err(|_| ())?;
    Ok(())
}

fn action_for(target: LeadStatus) -> Option<lead_flow::Input> {
    match target {
        LeadStatus::New => None,
        LeadStatus::GatheringInfo => Some(lead_flow::Input::Gather),
        LeadStatus::Qualified => Some(lead_flow::Input::Qualify),
        LeadStatus::Disqualified => Some(lead_flow::Input::Disqualify),
        LeadStatus::MeetingRequested => Some(lead_flow::Input::RequestMeeting),
        LeadStatus::PendingConfirmation => Some(lead_flow::Input::AwaitConfirmation),
        LeadStatus::MeetingConfirmed => Some(lead_flow::Input::ConfirmMeeting),
    }
}

/// Staying in place is always allowed; any other move must be an edge of the
/// machine.
pub fn transition(current: LeadStatus, target: LeadStatus) -> Option<LeadStatus> {
    if current == target {
        return Some(current);
    }
    let mut machine = lead_flow::StateMachine::new();
    hydrate(&mut machine, current).ok()?;
    let input = action_for(target)?;
    machine.consume(&input).ok()?;
    Some(target)
}
