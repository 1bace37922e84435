//! Target service catalog
//!
//! Chains address backend modules by a closed set of service identifiers.
//! Base URLs come from configuration; the catalog here only carries static
//! metadata about each module and the endpoints it is known to expose.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ChainError;
use super::step::HttpMethod;

/// Backend module a chain step calls
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TargetService {
    Character,
    #[serde(alias = "location")]
    Scene,
    #[serde(alias = "inventory")]
    Item,
    #[serde(alias = "story")]
    Narrative,
    #[serde(alias = "classifier")]
    Intent,
}

impl TargetService {
    pub const ALL: [TargetService; 5] = [
        Self::Character,
        Self::Scene,
        Self::Item,
        Self::Narrative,
        Self::Intent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Scene => "scene",
            Self::Item => "item",
            Self::Narrative => "narrative",
            Self::Intent => "intent",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Character => "Character",
            Self::Scene => "Scene",
            Self::Item => "Item",
            Self::Narrative => "Narrative",
            Self::Intent => "Intent Classifier",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Character => "Character sheets, stats and state changes",
            Self::Scene => "Scene and location state",
            Self::Item => "Items and character inventories",
            Self::Narrative => "Narrative generation for story beats",
            Self::Intent => "Classifies free-form player messages into intents",
        }
    }

    /// Endpoints the module is known to expose
    pub fn endpoints(&self) -> &'static [EndpointInfo] {
        match self {
            Self::Character => CHARACTER_ENDPOINTS,
            Self::Scene => SCENE_ENDPOINTS,
            Self::Item => ITEM_ENDPOINTS,
            Self::Narrative => NARRATIVE_ENDPOINTS,
            Self::Intent => INTENT_ENDPOINTS,
        }
    }

    pub fn info(&self) -> ModuleInfo {
        ModuleInfo {
            name: self.as_str(),
            display_name: self.display_name(),
            description: self.description(),
            endpoints: self.endpoints(),
        }
    }
}

impl fmt::Display for TargetService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TargetService {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "character" => Ok(Self::Character),
            "scene" | "location" => Ok(Self::Scene),
            "item" | "inventory" => Ok(Self::Item),
            "narrative" | "story" => Ok(Self::Narrative),
            "intent" | "classifier" => Ok(Self::Intent),
            _ => Err(ChainError::validation(format!("Unknown target service '{}'", s))),
        }
    }
}

/// Static description of a known endpoint
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct EndpointInfo {
    pub method: HttpMethod,
    pub path: &'static str,
    pub description: &'static str,
}

const fn endpoint(method: HttpMethod, path: &'static str, description: &'static str) -> EndpointInfo {
    EndpointInfo {
        method,
        path,
        description,
    }
}

/// Module metadata returned by the modules API
#[derive(Debug, Clone, Serialize)]
pub struct ModuleInfo {
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub endpoints: &'static [EndpointInfo],
}

const CHARACTER_ENDPOINTS: &[EndpointInfo] = &[
    endpoint(HttpMethod::GET, "/character/{name}", "Fetch a character sheet"),
    endpoint(HttpMethod::POST, "/character", "Create a character"),
    endpoint(HttpMethod::PATCH, "/character/{name}", "Update character fields"),
    endpoint(HttpMethod::POST, "/character/{name}/action", "Apply an intent to a character"),
    endpoint(HttpMethod::DELETE, "/character/{name}", "Delete a character"),
];

const SCENE_ENDPOINTS: &[EndpointInfo] = &[
    endpoint(HttpMethod::GET, "/scene/{id}", "Fetch scene state"),
    endpoint(HttpMethod::POST, "/scene", "Create a scene"),
    endpoint(HttpMethod::PATCH, "/scene/{id}", "Update scene state"),
    endpoint(HttpMethod::GET, "/scene/{id}/characters", "List characters present in a scene"),
];

const ITEM_ENDPOINTS: &[EndpointInfo] = &[
    endpoint(HttpMethod::GET, "/item/{id}", "Fetch an item"),
    endpoint(HttpMethod::GET, "/inventory/{character}", "List a character's inventory"),
    endpoint(HttpMethod::POST, "/inventory/{character}", "Add an item to an inventory"),
    endpoint(HttpMethod::DELETE, "/inventory/{character}/{item}", "Remove an item"),
];

const NARRATIVE_ENDPOINTS: &[EndpointInfo] = &[
    endpoint(HttpMethod::POST, "/narrative/generate", "Generate narration for an event"),
    endpoint(HttpMethod::GET, "/narrative/{session}", "Fetch the narrative log of a session"),
];

const INTENT_ENDPOINTS: &[EndpointInfo] = &[
    endpoint(HttpMethod::POST, "/intent/classify", "Classify a player message"),
];
