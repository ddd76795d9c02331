//! Profile choices and the in-progress draft collected by the form.

use serde::{Deserialize, Serialize};

use crate::identity::service::{ProfileMetadata, ProfileUpdate};

/// A label that matches none of the offered choices.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind}: {value}")]
pub struct UnknownChoice {
    pub kind: &'static str,
    pub value: String,
}

/// Lowercase alphanumerics only, so "south-africa" and "South Africa" match.
fn fold(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Teams a user can pick as their favourite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    India,
    Australia,
    England,
    Pakistan,
    #[serde(rename = "South Africa")]
    SouthAfrica,
    #[serde(rename = "New Zealand")]
    NewZealand,
    #[serde(rename = "West Indies")]
    WestIndies,
    #[serde(rename = "Sri Lanka")]
    SriLanka,
}

impl Team {
    /// Every team, in the order the form offers them.
    pub const ALL: [Team; 8] = [
        Team::India,
        Team::Australia,
        Team::England,
        Team::Pakistan,
        Team::SouthAfrica,
        Team::NewZealand,
        Team::WestIndies,
        Team::SriLanka,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::India => "India",
            Self::Australia => "Australia",
            Self::England => "England",
            Self::Pakistan => "Pakistan",
            Self::SouthAfrica => "South Africa",
            Self::NewZealand => "New Zealand",
            Self::WestIndies => "West Indies",
            Self::SriLanka => "Sri Lanka",
        }
    }

    /// Exact stored label, as found in identity metadata.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.label() == label)
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Team {
    type Err = UnknownChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = fold(s);
        Self::ALL
            .into_iter()
            .find(|t| fold(t.label()) == wanted)
            .ok_or_else(|| UnknownChoice {
                kind: "team",
                value: s.to_string(),
            })
    }
}

/// How the user follows the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Fan,
    #[serde(rename = "Fantasy Player")]
    FantasyPlayer,
    Analyst,
    #[serde(rename = "Coach / Player")]
    CoachOrPlayer,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Fan,
        Role::FantasyPlayer,
        Role::Analyst,
        Role::CoachOrPlayer,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Fan => "Fan",
            Self::FantasyPlayer => "Fantasy Player",
            Self::Analyst => "Analyst",
            Self::CoachOrPlayer => "Coach / Player",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.label() == label)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Role {
    type Err = UnknownChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = fold(s);
        Self::ALL
            .into_iter()
            .find(|r| fold(r.label()) == wanted)
            .ok_or_else(|| UnknownChoice {
                kind: "role",
                value: s.to_string(),
            })
    }
}

/// Unsaved profile edits. Created empty each time the flow opens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileDraft {
    /// Free text; blank means "leave the current username alone".
    pub username: String,
    pub favorite_team: Option<Team>,
    pub role: Option<Role>,
}

impl ProfileDraft {
    /// Team and role are required, username never is.
    pub fn is_ready(&self) -> bool {
        self.favorite_team.is_some() && self.role.is_some()
    }

    /// The committable form of this draft, if it is ready.
    pub fn ready(&self) -> Option<ReadyProfile> {
        let username = self.username.trim();
        Some(ReadyProfile {
            username: (!username.is_empty()).then(|| username.to_string()),
            favorite_team: self.favorite_team?,
            role: self.role?,
        })
    }
}

/// A draft with every required field present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyProfile {
    pub username: Option<String>,
    pub favorite_team: Team,
    pub role: Role,
}

impl ReadyProfile {
    /// The identity update that marks the profile complete.
    pub fn to_update(&self) -> ProfileUpdate {
        ProfileUpdate {
            username: self.username.clone(),
            metadata: ProfileMetadata {
                profile_complete: true,
                favorite_team: self.favorite_team,
                role: self.role,
            },
        }
    }
}
