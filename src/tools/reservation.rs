//! Demo tool handlers for a hotel-reservation voice agent deployment.
//!
//! Grounded on `original_source/src/reservation/tools.py`'s
//! `query_room_inventory`/`create_reservation_ticket`/`check_ticket_status`.
//! The original reads/writes a shadow Postgres cache kept fresh from an
//! ERP by a sync service (out of scope per spec §1 Non-goals: "no
//! database/CRM integration"); this keeps the same tool *surface* the
//! LLM sees but backs it with an in-memory seeded fixture instead, since
//! the spec's scope is the call-handling pipeline, not a reservation
//! backend.

use std::sync::Mutex;

use chrono::NaiveDate;
use serde::Deserialize;

use super::ToolRegistry;

#[derive(Debug, Clone)]
struct RoomAvailability {
    room_type: &'static str,
    rate_per_night: f64,
    amenities: &'static [&'static str],
}

#[derive(Debug, Clone)]
struct Ticket {
    ticket_id: String,
    guest_name: String,
    phone_number: String,
    check_in: String,
    check_out: String,
    room_type: String,
    status: &'static str,
}

/// Seeded room catalog plus an in-process ticket ledger, standing in for
/// the original's shadow-inventory Postgres cache and ERP ticket queue.
pub struct InMemoryInventory {
    rooms: Vec<RoomAvailability>,
    tickets: Mutex<Vec<Ticket>>,
}

impl InMemoryInventory {
    pub fn seeded() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            rooms: vec![
                RoomAvailability { room_type: "standard", rate_per_night: 129.0, amenities: &["WiFi", "TV", "Coffee Maker"] },
                RoomAvailability {
                    room_type: "deluxe",
                    rate_per_night: 189.0,
                    amenities: &["WiFi", "TV", "Coffee Maker", "City View", "Complimentary Breakfast"],
                },
                RoomAvailability {
                    room_type: "suite",
                    rate_per_night: 349.0,
                    amenities: &["WiFi", "TV", "Coffee Maker", "City View", "Complimentary Breakfast", "Living Room", "Mini Bar"],
                },
            ],
            tickets: Mutex::new(Vec::new()),
        })
    }

    fn query(&self, check_in: &str, check_out: &str, guests: u32) -> serde_json::Value {
        let (in_date, out_date) = match (NaiveDate::parse_from_str(check_in, "%Y-%m-%d"), NaiveDate::parse_from_str(check_out, "%Y-%m-%d")) {
            (Ok(a), Ok(b)) => (a, b),
            _ => return serde_json::json!({ "error": "dates must be formatted YYYY-MM-DD", "available_rooms": [] }),
        };
        let nights = (out_date - in_date).num_days();
        if nights <= 0 {
            return serde_json::json!({ "error": "check-out must be after check-in", "available_rooms": [] });
        }

        let available_rooms: Vec<_> = self
            .rooms
            .iter()
            .map(|room| {
                serde_json::json!({
                    "room_type": room.room_type,
                    "available": true,
                    "rate_per_night": room.rate_per_night,
                    "total_nights": nights,
                    "total_estimate": room.rate_per_night * nights as f64,
                    "amenities": room.amenities,
                })
            })
            .collect();

        serde_json::json!({
            "check_in": check_in,
            "check_out": check_out,
            "guests": guests,
            "available_rooms": available_rooms,
        })
    }

    fn create_ticket(
        &self,
        guest_name: String,
        phone_number: String,
        check_in: String,
        check_out: String,
        room_type: String,
        special_requests: Option<String>,
    ) -> serde_json::Value {
        let (in_date, out_date) = match (
            NaiveDate::parse_from_str(&check_in, "%Y-%m-%d"),
            NaiveDate::parse_from_str(&check_out, "%Y-%m-%d"),
        ) {
            (Ok(a), Ok(b)) => (a, b),
            _ => return serde_json::json!({ "error": "dates must be formatted YYYY-MM-DD" }),
        };
        let nights = (out_date - in_date).num_days().max(1);

        let mut tickets = self.tickets.lock().expect("ticket ledger mutex poisoned");
        let next_num = tickets.len() as u32 + 1;
        let ticket_id = format!("LOTUS-{next_num:04}");

        tickets.push(Ticket {
            ticket_id: ticket_id.clone(),
            guest_name: guest_name.clone(),
            phone_number: phone_number.clone(),
            check_in: check_in.clone(),
            check_out: check_out.clone(),
            room_type: room_type.clone(),
            status: "pending",
        });

        let mut message = format!(
            "Thank you {guest_name}! I've submitted your reservation request as ticket {ticket_id}. \
             You requested a {room_type} room for {nights} night{plural} from {check_in} to {check_out}. \
             Our front desk team will review and confirm within 30 minutes, and call you back at {phone_number} to finalize payment.",
            plural = if nights > 1 { "s" } else { "" },
        );
        if let Some(requests) = special_requests.filter(|r| !r.is_empty()) {
            message.push_str(&format!(" I've noted your special request: {requests}."));
        }
        message.push_str(" Is there anything else I can help you with?");

        serde_json::json!({
            "ticket_id": ticket_id,
            "status": "pending",
            "message": message,
            "expected_response_time": "30 minutes",
        })
    }

    fn check_status(&self, ticket_id: &str) -> serde_json::Value {
        let tickets = self.tickets.lock().expect("ticket ledger mutex poisoned");
        match tickets.iter().find(|t| t.ticket_id == ticket_id) {
            Some(ticket) => serde_json::json!({
                "found": true,
                "ticket_id": ticket.ticket_id,
                "status": ticket.status,
                "guest_name": ticket.guest_name,
                "phone_number": ticket.phone_number,
                "room_type": ticket.room_type,
                "check_in": ticket.check_in,
                "check_out": ticket.check_out,
                "message": format!("Ticket {} is still being reviewed by our staff.", ticket.ticket_id),
            }),
            None => serde_json::json!({
                "found": false,
                "message": format!("I couldn't find a ticket with ID {ticket_id}. Please double-check the number."),
            }),
        }
    }
}

#[derive(Deserialize)]
struct QueryArgs {
    check_in: String,
    check_out: String,
    #[serde(default)]
    guests: u32,
}

#[derive(Deserialize)]
struct CreateTicketArgs {
    guest_name: String,
    phone_number: String,
    check_in: String,
    check_out: String,
    room_type: String,
    #[serde(default)]
    special_requests: Option<String>,
}

#[derive(Deserialize)]
struct StatusArgs {
    ticket_id: String,
}

pub fn register(registry: &mut ToolRegistry, inventory: std::sync::Arc<InMemoryInventory>) {
    let inv = inventory.clone();
    registry.register(
        "query_room_inventory",
        "Check room availability and nightly rates for a date range.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "check_in": {"type": "string", "description": "Check-in date, YYYY-MM-DD"},
                "check_out": {"type": "string", "description": "Check-out date, YYYY-MM-DD"},
                "guests": {"type": "integer"},
            },
            "required": ["check_in", "check_out"],
        }),
        move |args| {
            let inv = inv.clone();
            async move {
                match serde_json::from_value::<QueryArgs>(args) {
                    Ok(a) => inv.query(&a.check_in, &a.check_out, a.guests),
                    Err(e) => serde_json::json!({ "error": format!("invalid arguments: {e}") }),
                }
            }
        },
    );

    let inv = inventory.clone();
    registry.register(
        "create_reservation_ticket",
        "File a reservation request for staff review and callback.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "guest_name": {"type": "string"},
                "phone_number": {"type": "string"},
                "check_in": {"type": "string", "description": "YYYY-MM-DD"},
                "check_out": {"type": "string", "description": "YYYY-MM-DD"},
                "room_type": {"type": "string"},
                "special_requests": {"type": "string"},
            },
            "required": ["guest_name", "phone_number", "check_in", "check_out", "room_type"],
        }),
        move |args| {
            let inv = inv.clone();
            async move {
                match serde_json::from_value::<CreateTicketArgs>(args) {
                    Ok(a) => inv.create_ticket(a.guest_name, a.phone_number, a.check_in, a.check_out, a.room_type, a.special_requests),
                    Err(e) => serde_json::json!({ "error": format!("invalid arguments: {e}") }),
                }
            }
        },
    );

    let inv = inventory.clone();
    registry.register(
        "check_ticket_status",
        "Look up the status of a previously filed reservation ticket.",
        serde_json::json!({
            "type": "object",
            "properties": { "ticket_id": {"type": "string"} },
            "required": ["ticket_id"],
        }),
        move |args| {
            let inv = inv.clone();
            async move {
                match serde_json::from_value::<StatusArgs>(args) {
                    Ok(a) => inv.check_status(&a.ticket_id),
                    Err(e) => serde_json::json!({ "error": format!("invalid arguments: {e}") }),
                }
            }
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolCall;

    #[tokio::test]
    async fn first_ticket_is_numbered_lotus_0001() {
        let mut registry = ToolRegistry::new();
        register(&mut registry, InMemoryInventory::seeded());

        let result = registry
            .invoke(ToolCall {
                call_id: "c1".into(),
                name: "create_reservation_ticket".into(),
                arguments: serde_json::json!({
                    "guest_name": "Dana",
                    "phone_number": "555-0100",
                    "check_in": "2026-08-01",
                    "check_out": "2026-08-03",
                    "room_type": "suite",
                    "special_requests": "",
                }),
            })
            .await;

        assert_eq!(result.output["ticket_id"], "LOTUS-0001");
    }

    #[tokio::test]
    async fn sequential_tickets_increment() {
        let mut registry = ToolRegistry::new();
        register(&mut registry, InMemoryInventory::seeded());
        let args = serde_json::json!({
            "guest_name": "Dana", "phone_number": "555-0100",
            "check_in": "2026-08-01", "check_out": "2026-08-03", "room_type": "suite",
        });

        for expected in ["LOTUS-0001", "LOTUS-0002"] {
            let result = registry
                .invoke(ToolCall { call_id: "c".into(), name: "create_reservation_ticket".into(), arguments: args.clone() })
                .await;
            assert_eq!(result.output["ticket_id"], expected);
        }
    }

    #[tokio::test]
    async fn query_rejects_checkout_before_checkin() {
        let mut registry = ToolRegistry::new();
        register(&mut registry, InMemoryInventory::seeded());
        let result = registry
            .invoke(ToolCall {
                call_id: "c".into(),
                name: "query_room_inventory".into(),
                arguments: serde_json::json!({ "check_in": "2026-08-03", "check_out": "2026-08-01", "guests": 2 }),
            })
            .await;
        assert!(result.output.get("error").is_some());
    }

    #[tokio::test]
    async fn status_lookup_for_unknown_ticket_is_not_found() {
        let mut registry = ToolRegistry::new();
        register(&mut registry, InMemoryInventory::seeded());
        let result = registry
            .invoke(ToolCall { call_id: "c".into(), name: "check_ticket_status".into(), arguments: serde_json::json!({ "ticket_id": "LOTUS-9999" }) })
            .await;
        assert_eq!(result.output["found"], false);
    }
}
