//! Record types served by the record store.
//!
//! Field names match the store's upper-case column names. IDs arrive as
//! strings or integers depending on the table, timestamps as epoch seconds
//! (sometimes stringified), so both are decoded leniently.

use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Lenient scalar decoding
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl RawScalar {
    fn into_id(self) -> Option<String> {
        match self {
            RawScalar::Int(n) => Some(n.to_string()),
            RawScalar::Float(f) => Some((f as i64).to_string()),
            RawScalar::Str(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            RawScalar::Bool(_) => None,
        }
    }

    fn into_epoch(self) -> Option<i64> {
        match self {
            RawScalar::Int(n) => Some(n),
            RawScalar::Float(f) if f.is_finite() => Some(f as i64),
            RawScalar::Float(_) => None,
            RawScalar::Str(s) => s.trim().parse::<i64>().ok(),
            RawScalar::Bool(_) => None,
        }
    }
}

fn de_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    RawScalar::deserialize(d)?
        .into_id()
        .ok_or_else(|| serde::de::Error::custom("empty record id"))
}

fn de_opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawScalar>::deserialize(d)?.and_then(RawScalar::into_id))
}

fn de_epoch<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    RawScalar::deserialize(d)?
        .into_epoch()
        .ok_or_else(|| serde::de::Error::custom("invalid epoch timestamp"))
}

fn de_opt_epoch<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(Option::<RawScalar>::deserialize(d)?
        .and_then(RawScalar::into_epoch)
        .filter(|ts| *ts > 0))
}

fn de_opt_limit<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    Ok(Option::<RawScalar>::deserialize(d)?
        .and_then(RawScalar::into_epoch)
        .and_then(|n| u32::try_from(n).ok()))
}

/// Free text that may arrive as a number (phone handles) or null.
fn de_opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawScalar>::deserialize(d)?.and_then(RawScalar::into_id))
}

fn de_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(de_opt_text(d)?.unwrap_or_default())
}

fn de_priority<'de, D: Deserializer<'de>>(d: D) -> Result<i32, D::Error> {
    Ok(Option::<RawScalar>::deserialize(d)?
        .and_then(RawScalar::into_epoch)
        .and_then(|n| i32::try_from(n).ok())
        .unwrap_or(0))
}

fn de_flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Option::<RawScalar>::deserialize(d)? {
        Some(RawScalar::Bool(b)) => b,
        Some(RawScalar::Int(n)) => n != 0,
        Some(RawScalar::Str(s)) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "1" | "si" | "sí" | "yes"
        ),
        _ => false,
    })
}

/// Normalize a categorical wire tag: trimmed, upper-case, spaces and dashes
/// folded to underscores.
fn normalize_tag(raw: &str) -> String {
    raw.trim()
        .to_uppercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

// ============================================================================
// Categorical tags
// ============================================================================

/// Pipeline stage of a client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum ClientStatus {
    New,
    NoResponse,
    FollowUp,
    NotInterested,
    LinkSent,
    Paid,
    Vip,
    VipFollowUp,
    VipPaid,
    #[default]
    Unknown,
}

impl ClientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientStatus::New => "NUEVO",
            ClientStatus::NoResponse => "SIN_RESPUESTA",
            ClientStatus::FollowUp => "SEGUIMIENTO",
            ClientStatus::NotInterested => "NO_INTERESADO",
            ClientStatus::LinkSent => "LINK_ENVIADO",
            ClientStatus::Paid => "PAGADO",
            ClientStatus::Vip => "VIP",
            ClientStatus::VipFollowUp => "VIP_SEGUIMIENTO",
            ClientStatus::VipPaid => "VIP_PAGADO",
            ClientStatus::Unknown => "DESCONOCIDO",
        }
    }

    pub fn is_vip(&self) -> bool {
        match self {
            ClientStatus::Vip | ClientStatus::VipFollowUp | ClientStatus::VipPaid => true,
            ClientStatus::New
            | ClientStatus::NoResponse
            | ClientStatus::FollowUp
            | ClientStatus::NotInterested
            | ClientStatus::LinkSent
            | ClientStatus::Paid
            | ClientStatus::Unknown => false,
        }
    }

    /// Status denotes a completed sale.
    pub fn is_sale(&self) -> bool {
        match self {
            ClientStatus::Paid | ClientStatus::VipPaid => true,
            ClientStatus::New
            | ClientStatus::NoResponse
            | ClientStatus::FollowUp
            | ClientStatus::NotInterested
            | ClientStatus::LinkSent
            | ClientStatus::Vip
            | ClientStatus::VipFollowUp
            | ClientStatus::Unknown => false,
        }
    }
}

impl From<String> for ClientStatus {
    fn from(raw: String) -> Self {
        match normalize_tag(&raw).as_str() {
            "NUEVO" => ClientStatus::New,
            "SIN_RESPUESTA" => ClientStatus::NoResponse,
            "SEGUIMIENTO" => ClientStatus::FollowUp,
            "NO_INTERESADO" => ClientStatus::NotInterested,
            "LINK_ENVIADO" | "LINK" => ClientStatus::LinkSent,
            "PAGADO" => ClientStatus::Paid,
            "VIP" => ClientStatus::Vip,
            "VIP_SEGUIMIENTO" => ClientStatus::VipFollowUp,
            "VIP_PAGADO" => ClientStatus::VipPaid,
            _ => ClientStatus::Unknown,
        }
    }
}

impl From<Option<String>> for ClientStatus {
    fn from(raw: Option<String>) -> Self {
        raw.map(Self::from).unwrap_or_default()
    }
}

impl From<ClientStatus> for String {
    fn from(status: ClientStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Outcome tag carried by a report row (`ESTADO_NUEVO`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum ReportOutcome {
    AwaitingResponse,
    Paid,
    FollowUp,
    NoAnswer,
    NotInterested,
    LinkSent,
    #[default]
    Unknown,
}

impl ReportOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportOutcome::AwaitingResponse => "ESPERANDO_RESPUESTA",
            ReportOutcome::Paid => "PAGADO",
            ReportOutcome::FollowUp => "SEGUIMIENTO",
            ReportOutcome::NoAnswer => "NO_CONTESTA",
            ReportOutcome::NotInterested => "NO_INTERESADO",
            ReportOutcome::LinkSent => "LINK_ENVIADO",
            ReportOutcome::Unknown => "DESCONOCIDO",
        }
    }

    /// A definitive outcome, as opposed to the "awaiting response"
    /// placeholder or an unrecognized tag.
    pub fn is_definitive(&self) -> bool {
        match self {
            ReportOutcome::Paid
            | ReportOutcome::FollowUp
            | ReportOutcome::NoAnswer
            | ReportOutcome::NotInterested
            | ReportOutcome::LinkSent => true,
            ReportOutcome::AwaitingResponse | ReportOutcome::Unknown => false,
        }
    }
}

impl From<String> for ReportOutcome {
    fn from(raw: String) -> Self {
        match normalize_tag(&raw).as_str() {
            "ESPERANDO_RESPUESTA" | "ESPERANDO" => ReportOutcome::AwaitingResponse,
            "PAGADO" => ReportOutcome::Paid,
            "SEGUIMIENTO" => ReportOutcome::FollowUp,
            "NO_CONTESTA" => ReportOutcome::NoAnswer,
            "NO_INTERESADO" => ReportOutcome::NotInterested,
            "LINK_ENVIADO" | "LINK" => ReportOutcome::LinkSent,
            _ => ReportOutcome::Unknown,
        }
    }
}

impl From<Option<String>> for ReportOutcome {
    fn from(raw: Option<String>) -> Self {
        raw.map(Self::from).unwrap_or_default()
    }
}

impl From<ReportOutcome> for String {
    fn from(outcome: ReportOutcome) -> Self {
        outcome.as_str().to_string()
    }
}

/// Product a report refers to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum Product {
    Principal,
    Downsell,
    #[default]
    Unknown,
}

impl From<String> for Product {
    fn from(raw: String) -> Self {
        match normalize_tag(&raw).as_str() {
            "PRINCIPAL" => Product::Principal,
            "DOWNSELL" => Product::Downsell,
            _ => Product::Unknown,
        }
    }
}

impl From<Option<String>> for Product {
    fn from(raw: Option<String>) -> Self {
        raw.map(Self::from).unwrap_or_default()
    }
}

impl From<Product> for String {
    fn from(product: Product) -> Self {
        match product {
            Product::Principal => "PRINCIPAL",
            Product::Downsell => "DOWNSELL",
            Product::Unknown => "DESCONOCIDO",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum Direction {
    Inbound,
    Outbound,
    #[default]
    Unknown,
}

impl From<String> for Direction {
    fn from(raw: String) -> Self {
        match normalize_tag(&raw).as_str() {
            "ENTRANTE" | "IN" | "INBOUND" => Direction::Inbound,
            "SALIENTE" | "OUT" | "OUTBOUND" => Direction::Outbound,
            _ => Direction::Unknown,
        }
    }
}

impl From<Option<String>> for Direction {
    fn from(raw: Option<String>) -> Self {
        raw.map(Self::from).unwrap_or_default()
    }
}

impl From<Direction> for String {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Inbound => "ENTRANTE",
            Direction::Outbound => "SALIENTE",
            Direction::Unknown => "DESCONOCIDO",
        }
        .to_string()
    }
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisor {
    #[serde(rename = "ID", deserialize_with = "de_id")]
    pub id: String,
    #[serde(rename = "NOMBRE", default, deserialize_with = "de_text")]
    pub name: String,
    #[serde(
        rename = "WHATSAPP",
        default,
        deserialize_with = "de_opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub whatsapp: Option<String>,
    #[serde(
        rename = "TELEGRAM",
        default,
        deserialize_with = "de_opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub telegram: Option<String>,
    #[serde(rename = "PRIORIDAD", default, deserialize_with = "de_priority")]
    pub priority: i32,
    #[serde(
        rename = "LIMITE_DIARIO",
        default,
        deserialize_with = "de_opt_limit",
        skip_serializing_if = "Option::is_none"
    )]
    pub daily_limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    #[serde(rename = "ID", deserialize_with = "de_id")]
    pub id: String,
    #[serde(rename = "ID_ASESOR", default, deserialize_with = "de_opt_id")]
    pub advisor_id: Option<String>,
    #[serde(rename = "FECHA_CREACION", deserialize_with = "de_epoch")]
    pub created_at: i64,
    #[serde(rename = "ESTADO", default)]
    pub status: ClientStatus,
    #[serde(
        rename = "WHATSAPP",
        default,
        deserialize_with = "de_opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub whatsapp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(rename = "ID", deserialize_with = "de_id")]
    pub id: String,
    #[serde(rename = "ID_CLIENTE", deserialize_with = "de_id")]
    pub client_id: String,
    #[serde(rename = "ID_ASESOR", default, deserialize_with = "de_opt_id")]
    pub advisor_id: Option<String>,
    #[serde(rename = "FECHA", deserialize_with = "de_epoch")]
    pub reported_at: i64,
    #[serde(rename = "FECHA_SEGUIMIENTO", default, deserialize_with = "de_opt_epoch")]
    pub follow_up_at: Option<i64>,
    #[serde(rename = "COMPLETADO", default, deserialize_with = "de_flag")]
    pub follow_up_done: bool,
    #[serde(rename = "ESTADO_NUEVO", default)]
    pub outcome: ReportOutcome,
    #[serde(rename = "PRODUCTO", default)]
    pub product: Product,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    #[serde(rename = "ID", deserialize_with = "de_id")]
    pub id: String,
    #[serde(rename = "ID_ASESOR", default, deserialize_with = "de_opt_id")]
    pub advisor_id: Option<String>,
    #[serde(rename = "ID_CLIENTE", default, deserialize_with = "de_opt_id")]
    pub client_id: Option<String>,
    #[serde(rename = "FECHA", deserialize_with = "de_epoch")]
    pub registered_at: i64,
}

/// One logged conversation message. Only the fields needed for metrics are
/// projected from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "ID_ASESOR", deserialize_with = "de_id")]
    pub advisor_id: String,
    #[serde(rename = "ID_CLIENTE", default, deserialize_with = "de_opt_id")]
    pub client_id: Option<String>,
    #[serde(rename = "FECHA", deserialize_with = "de_epoch")]
    pub sent_at: i64,
    #[serde(rename = "DIRECCION", default)]
    pub direction: Direction,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_decodes_numeric_ids_and_string_epoch() {
        let client: Client = serde_json::from_value(json!({
            "ID": 42,
            "ID_ASESOR": "7",
            "FECHA_CREACION": "1700000000",
            "ESTADO": "vip seguimiento"
        }))
        .unwrap();
        assert_eq!(client.id, "42");
        assert_eq!(client.advisor_id.as_deref(), Some("7"));
        assert_eq!(client.created_at, 1_700_000_000);
        assert_eq!(client.status, ClientStatus::VipFollowUp);
        assert!(client.status.is_vip());
    }

    #[test]
    fn test_unknown_status_is_not_an_error() {
        let client: Client = serde_json::from_value(json!({
            "ID": "c1",
            "FECHA_CREACION": 10,
            "ESTADO": "ARCHIVADO"
        }))
        .unwrap();
        assert_eq!(client.status, ClientStatus::Unknown);
        assert!(client.advisor_id.is_none());
    }

    #[test]
    fn test_report_optional_fields_default() {
        let report: Report = serde_json::from_value(json!({
            "ID": 1,
            "ID_CLIENTE": 2,
            "FECHA": 3600,
            "FECHA_SEGUIMIENTO": "",
            "ESTADO_NUEVO": "PAGADO"
        }))
        .unwrap();
        assert_eq!(report.follow_up_at, None);
        assert!(!report.follow_up_done);
        assert_eq!(report.outcome, ReportOutcome::Paid);
        assert_eq!(report.product, Product::Unknown);
    }

    #[test]
    fn test_awaiting_response_is_not_definitive() {
        assert!(!ReportOutcome::from("Esperando respuesta".to_string()).is_definitive());
        assert!(ReportOutcome::from("no contesta".to_string()).is_definitive());
        assert!(!ReportOutcome::Unknown.is_definitive());
    }

    #[test]
    fn test_completion_flag_accepts_store_variants() {
        let report: Report = serde_json::from_value(json!({
            "ID": "r", "ID_CLIENTE": "c", "FECHA": 1, "COMPLETADO": "SI"
        }))
        .unwrap();
        assert!(report.follow_up_done);
    }

    #[test]
    fn test_status_serializes_as_wire_tag() {
        let value = serde_json::to_value(ClientStatus::VipPaid).unwrap();
        assert_eq!(value, json!("VIP_PAGADO"));
    }

    #[test]
    fn test_advisor_priority_tolerates_null_and_strings() {
        let rows = vec![
            json!({ "ID": 1, "NOMBRE": "Ana", "PRIORIDAD": null }),
            json!({ "ID": 2, "NOMBRE": "Luis", "PRIORIDAD": "2" }),
            json!({ "ID": 3, "NOMBRE": "Eva", "PRIORIDAD": "alta" }),
        ];
        let (advisors, skipped) = crate::source::decode_records::<Advisor>("advisors", rows);
        assert_eq!(skipped, 0);
        let priorities: Vec<i32> = advisors.iter().map(|a| a.priority).collect();
        assert_eq!(priorities, vec![0, 2, 0]);
    }

    #[test]
    fn test_numeric_handles_and_null_name() {
        let advisor: Advisor = serde_json::from_value(json!({
            "ID": 7, "NOMBRE": null, "WHATSAPP": 573001234567u64, "TELEGRAM": "  "
        }))
        .unwrap();
        assert_eq!(advisor.name, "");
        assert_eq!(advisor.whatsapp.as_deref(), Some("573001234567"));
        assert_eq!(advisor.telegram, None);

        let rows = vec![json!({
            "ID": "c1", "ID_ASESOR": 7, "FECHA_CREACION": 10, "WHATSAPP": 573001234567u64
        })];
        let (clients, skipped) = crate::source::decode_records::<Client>("clients", rows);
        assert_eq!(skipped, 0);
        assert_eq!(clients[0].whatsapp.as_deref(), Some("573001234567"));
    }

    #[test]
    fn test_message_direction_aliases() {
        let msg: Message = serde_json::from_value(json!({
            "ID_ASESOR": 3, "ID_CLIENTE": null, "FECHA": 99, "DIRECCION": "saliente"
        }))
        .unwrap();
        assert_eq!(msg.direction, Direction::Outbound);
        assert!(msg.client_id.is_none());
    }
}
