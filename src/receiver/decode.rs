//! Response decoders for the receiver's HTTP API
//!
//! Two endpoints are dual-shaped in the wild: the services list (nested vs
//! flat-with-subservices) and the EPG (JSON vs legacy XML). Decoders here are
//! pure `&str -> Result<_, String>`; the client wraps failures into
//! `ReceiverError::BadResponse` and remembers which shape a host speaks.

use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Deserialize;

use crate::models::{Bouquet, EpgEvent, ServiceEntry, TimerEntry};

/// Which services-list shape a receiver speaks; cached per host after the
/// first successful decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServicesShape {
    Nested,
    Flat,
}

/// Bouquet container references carry this prefix and are not recordable.
const BOUQUET_REF_PREFIX: &str = "1:7:";

pub fn decode_bouquets(body: &str) -> Result<Vec<Bouquet>, String> {
    #[derive(Deserialize)]
    struct Doc {
        #[serde(default)]
        bouquets: Vec<(String, String)>,
    }

    let doc: Doc = serde_json::from_str(body).map_err(|e| format!("bouquet list: {e}"))?;
    Ok(doc
        .bouquets
        .into_iter()
        .map(|(service_ref, name)| Bouquet { service_ref, name })
        .collect())
}

#[derive(Deserialize)]
struct NestedServicesDoc {
    services: Vec<NestedServiceWire>,
}

// deny_unknown_fields makes the nested decoder reject the flat shape, which
// is what drives the fallback.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NestedServiceWire {
    #[serde(default)]
    servicename: String,
    servicereference: String,
}

#[derive(Deserialize)]
struct FlatServicesDoc {
    services: Vec<FlatServiceWire>,
}

#[derive(Deserialize)]
struct FlatServiceWire {
    #[serde(default)]
    servicename: String,
    #[serde(default)]
    servicereference: String,
    #[serde(default)]
    subservices: Vec<SubserviceWire>,
}

#[derive(Deserialize)]
struct SubserviceWire {
    #[serde(default)]
    servicename: String,
    #[serde(default)]
    servicereference: String,
}

fn keep_service(service_ref: &str) -> bool {
    !service_ref.is_empty() && !service_ref.starts_with(BOUQUET_REF_PREFIX)
}

pub fn decode_services_nested(body: &str) -> Result<Vec<ServiceEntry>, String> {
    let doc: NestedServicesDoc =
        serde_json::from_str(body).map_err(|e| format!("nested services: {e}"))?;
    Ok(doc
        .services
        .into_iter()
        .filter(|s| keep_service(&s.servicereference))
        .map(|s| ServiceEntry {
            service_ref: s.servicereference,
            name: s.servicename,
        })
        .collect())
}

/// Flat shape: top-level entries may be containers whose `subservices`
/// carry the actual channels.
pub fn decode_services_flat(body: &str) -> Result<Vec<ServiceEntry>, String> {
    let doc: FlatServicesDoc =
        serde_json::from_str(body).map_err(|e| format!("flat services: {e}"))?;

    let mut out = Vec::new();
    for service in doc.services {
        if service.subservices.is_empty() {
            if keep_service(&service.servicereference) {
                out.push(ServiceEntry {
                    service_ref: service.servicereference,
                    name: service.servicename,
                });
            }
            continue;
        }
        for sub in service.subservices {
            if keep_service(&sub.servicereference) {
                out.push(ServiceEntry {
                    service_ref: sub.servicereference,
                    name: sub.servicename,
                });
            }
        }
    }
    Ok(out)
}

/// Sniff JSON vs XML and decode. Events with an empty title or a
/// non-positive begin are dropped here so both shapes agree.
pub fn decode_epg(body: &str) -> Result<Vec<EpgEvent>, String> {
    let events = if body.trim_start().starts_with('<') {
        decode_epg_xml(body)?
    } else {
        decode_epg_json(body)?
    };
    Ok(events
        .into_iter()
        .filter(|e| !e.title.is_empty() && e.begin > 0)
        .collect())
}

#[derive(Deserialize)]
struct EpgDoc {
    #[serde(default)]
    events: Vec<EpgEventWire>,
}

#[derive(Deserialize)]
struct EpgEventWire {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    begin_timestamp: i64,
    #[serde(default)]
    duration_sec: i64,
    #[serde(default)]
    shortdesc: String,
    #[serde(default)]
    longdesc: String,
    #[serde(default)]
    sref: String,
}

fn decode_epg_json(body: &str) -> Result<Vec<EpgEvent>, String> {
    let doc: EpgDoc = serde_json::from_str(body).map_err(|e| format!("epg json: {e}"))?;
    Ok(doc
        .events
        .into_iter()
        .map(|e| EpgEvent {
            id: e.id,
            title: e.title,
            short_description: e.shortdesc,
            long_description: e.longdesc,
            begin: e.begin_timestamp,
            duration: e.duration_sec,
            service_ref: e.sref,
        })
        .collect())
}

/// Streaming parse of the legacy `e2eventlist/e2event/*` document.
fn decode_epg_xml(body: &str) -> Result<Vec<EpgEvent>, String> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut events = Vec::new();
    let mut current: Option<EpgEvent> = None;
    let mut current_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = std::str::from_utf8(e.name().as_ref())
                    .map_err(|e| format!("invalid UTF-8 in XML element name: {e}"))?
                    .to_string();
                if name == "e2event" {
                    current = Some(EpgEvent {
                        id: 0,
                        title: String::new(),
                        short_description: String::new(),
                        long_description: String::new(),
                        begin: 0,
                        duration: 0,
                        service_ref: String::new(),
                    });
                }
                current_text.clear();
            }
            Ok(Event::Text(ref t)) => {
                let text = t
                    .decode()
                    .map_err(|e| format!("invalid XML text: {e}"))?;
                current_text.push_str(&text);
            }
            Ok(Event::End(ref e)) => {
                let name_ref = e.name();
                let name = std::str::from_utf8(name_ref.as_ref())
                    .map_err(|e| format!("invalid UTF-8 in XML element name: {e}"))?;
                if let Some(ref mut event) = current {
                    let text = current_text.trim();
                    match name {
                        "e2eventid" => event.id = text.parse().unwrap_or(0),
                        "e2eventstart" => event.begin = text.parse().unwrap_or(0),
                        "e2eventduration" => event.duration = text.parse().unwrap_or(0),
                        "e2eventtitle" => event.title = text.to_string(),
                        "e2eventdescription" => event.short_description = text.to_string(),
                        "e2eventdescriptionextended" => {
                            event.long_description = text.to_string();
                        }
                        "e2eventservicereference" => event.service_ref = text.to_string(),
                        "e2event" => {
                            if let Some(done) = current.take() {
                                events.push(done);
                            }
                        }
                        _ => {}
                    }
                }
                current_text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("epg xml: {e}")),
            Ok(_) => {}
        }
    }

    Ok(events)
}

#[derive(Deserialize)]
struct TimerListDoc {
    #[serde(default)]
    timers: Vec<TimerWire>,
}

#[derive(Deserialize)]
struct TimerWire {
    #[serde(default)]
    serviceref: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    begin: i64,
    #[serde(default)]
    end: i64,
    state: Option<i64>,
    disabled: Option<i64>,
}

pub fn decode_timers(body: &str) -> Result<Vec<TimerEntry>, String> {
    let doc: TimerListDoc = serde_json::from_str(body).map_err(|e| format!("timer list: {e}"))?;
    Ok(doc
        .timers
        .into_iter()
        .map(|t| TimerEntry {
            service_ref: t.serviceref,
            name: t.name,
            begin: t.begin,
            end: t.end,
            state: t.state,
            disabled: t.disabled,
        })
        .collect())
}

/// Outcome of a timer add/delete call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerChangeResult {
    pub result: bool,
    pub message: String,
}

pub fn decode_timer_result(body: &str) -> Result<TimerChangeResult, String> {
    #[derive(Deserialize)]
    struct Doc {
        result: bool,
        #[serde(default)]
        message: String,
    }

    let doc: Doc = serde_json::from_str(body).map_err(|e| format!("timer result: {e}"))?;
    Ok(TimerChangeResult {
        result: doc.result,
        message: doc.message,
    })
}
