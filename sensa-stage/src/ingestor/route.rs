/// Source of an inbound device message, parsed from its topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// `v1/{org}[/{uniq}][/json]`
    Mqtt {
        org_id: &'a str,
        uniq_id: Option<&'a str>,
        json: bool,
    },
    /// `lora/{region}/gateway/{uniq}/event/{event}`
    LoraGateway { uniq_id: &'a str, event: &'a str },
    /// `lora/{region}/application/{app}/device/{uniq}/event/{event}`
    LoraDevice { uniq_id: &'a str, event: &'a str },
}

impl<'a> Route<'a> {
    /// Match a topic against the known templates. Anything else, including
    /// empty segments, is `None`.
    pub fn parse(topic: &'a str) -> Option<Self> {
        let parts: Vec<&str> = topic.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return None;
        }

        match parts.as_slice() {
            ["v1", org_id] => Some(Route::Mqtt {
                org_id,
                uniq_id: None,
                json: false,
            }),
            ["v1", org_id, "json"] => Some(Route::Mqtt {
                org_id,
                uniq_id: None,
                json: true,
            }),
            ["v1", org_id, uniq_id] => Some(Route::Mqtt {
                org_id,
                uniq_id: Some(uniq_id),
                json: false,
            }),
            ["v1", org_id, uniq_id, "json"] => Some(Route::Mqtt {
                org_id,
                uniq_id: Some(uniq_id),
                json: true,
            }),
            ["lora", _region, "gateway", uniq_id, "event", event] => {
                Some(Route::LoraGateway { uniq_id, event })
            }
            ["lora", _region, "application", _app, "device", uniq_id, "event", event] => {
                Some(Route::LoraDevice { uniq_id, event })
            }
            _ => None,
        }
    }
}
