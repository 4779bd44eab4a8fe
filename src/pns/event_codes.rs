use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Broad grouping of PNS event type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Winter,
    Wind,
    Flooding,
    Temps,
    Other,
}

impl EventCategory {
    /// Classify a raw event code. Unknown or missing codes fall into `Other`.
    pub fn classify(event_code: Option<&str>) -> Self {
        let Some(code) = event_code else {
            return EventCategory::Other;
        };
        let code = code.trim().to_ascii_uppercase().replace(' ', "_");

        match code.as_str() {
            "SNOW" | "SNOW_24" | "HEAVY_SNOW" | "SLEET" | "FREEZING_RAIN" | "ICE" => {
                EventCategory::Winter
            }
            "PKGUST" | "WIND" | "TSTM_WND_GST" => EventCategory::Wind,
            "FLOOD" | "FLASH_FLOOD" | "RAIN" => EventCategory::Flooding,
            "COLD" | "HEAT" | "TEMP" => EventCategory::Temps,
            _ => EventCategory::Other,
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventCategory::Winter => "winter",
            EventCategory::Wind => "wind",
            EventCategory::Flooding => "flooding",
            EventCategory::Temps => "temps",
            EventCategory::Other => "other",
        };
        f.write_str(name)
    }
}

impl FromStr for EventCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "winter" => Ok(EventCategory::Winter),
            "wind" => Ok(EventCategory::Wind),
            "flooding" => Ok(EventCategory::Flooding),
            "temps" => Ok(EventCategory::Temps),
            "other" => Ok(EventCategory::Other),
            other => Err(format!("unknown event category '{other}'")),
        }
    }
}
