use busline_catalog::{ClaimOutcome, ReleaseOutcome, SeatClaim, SeatStatus, Trip, TripSummary};
use busline_order::models::validate_passengers;
use busline_order::{Booking, BookingStatus, BookingUpdate, PassengerSeat, TicketCode};
use busline_shared::models::{ReleaseReason, ReservationEvent};
use busline_shared::Masked;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::identity::{parse_id, UserId};
use crate::payment::{ChargeReceipt, ChargeRequest, ChargeStatus, PaymentAdapter};
use crate::repository::{BookingStore, StoreError, TripCatalog};
use crate::{ConflictReason, CoreError, CoreResult, Entity, StateReason};

const TICKET_CODE_ATTEMPTS: usize = 5;

const OPEN: [BookingStatus; 2] = [BookingStatus::Pending, BookingStatus::Held];

/// Tunables for seat holds.
#[derive(Debug, Clone)]
pub struct ReservationPolicy {
    pub hold_duration: Duration,
    pub max_seats_per_booking: usize,
    pub currency: String,
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self {
            hold_duration: Duration::minutes(15),
            max_seats_per_booking: 10,
            currency: "VND".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PassengerInput {
    pub name: String,
    pub phone: String,
    pub seat_number: String,
}

impl From<PassengerInput> for PassengerSeat {
    fn from(input: PassengerInput) -> Self {
        PassengerSeat {
            name: input.name.trim().to_string(),
            phone: Masked::new(input.phone.trim().to_string()),
            seat_number: input.seat_number.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReservationReceipt {
    pub booking: Booking,
    pub seat_count: usize,
    pub total_amount: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingDetails {
    pub booking: Booking,
    pub trip: Option<TripSummary>,
}

/// Drives a booking through hold, payment, confirmation and release.
///
/// Seats are the arbiter of every race. A booking only moves forward after
/// the matching seat claim succeeded, and a release that finds a committed
/// seat stops the caller from cancelling or expiring the booking.
pub struct ReservationCoordinator {
    pub(crate) catalog: Arc<dyn TripCatalog>,
    pub(crate) bookings: Arc<dyn BookingStore>,
    pub(crate) payments: Arc<dyn PaymentAdapter>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) policy: ReservationPolicy,
    pub(crate) events: Option<broadcast::Sender<ReservationEvent>>,
}

impl ReservationCoordinator {
    pub fn new(
        catalog: Arc<dyn TripCatalog>,
        bookings: Arc<dyn BookingStore>,
        payments: Arc<dyn PaymentAdapter>,
        clock: Arc<dyn Clock>,
        policy: ReservationPolicy,
    ) -> Self {
        Self {
            catalog,
            bookings,
            payments,
            clock,
            policy,
            events: None,
        }
    }

    pub fn with_events(mut self, events: broadcast::Sender<ReservationEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn policy(&self) -> &ReservationPolicy {
        &self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Hold seats for a new booking. Either every requested seat ends up
    /// held by the booking or none does.
    pub async fn create_reservation(
        &self,
        user_id: &str,
        trip_id: &str,
        passengers: Vec<PassengerInput>,
    ) -> CoreResult<ReservationReceipt> {
        let user = UserId::parse(user_id)?;
        let trip_id = parse_id(Entity::Trip, trip_id)?;
        let trip = self.load_trip(trip_id).await?;

        if !trip.is_bookable() {
            warn!("Booking rejected: trip {} is {}", trip.id, trip.status.as_str());
            return Err(CoreError::Conflict(ConflictReason::TripNotBookable));
        }

        if passengers.len() > self.policy.max_seats_per_booking {
            return Err(CoreError::InvalidInput(format!(
                "at most {} seats per booking",
                self.policy.max_seats_per_booking
            )));
        }
        let passengers: Vec<PassengerSeat> = passengers.into_iter().map(PassengerSeat::from).collect();
        validate_passengers(&passengers)?;

        let now = self.clock.now();
        if let Some(taken) = first_unavailable(&trip, &passengers, now) {
            debug!("Seat {} on trip {} is not available", taken, trip.id);
            return Err(CoreError::Conflict(ConflictReason::SeatUnavailable(taken)));
        }

        let mut booking = Booking::new(
            user.into_string(),
            trip.id,
            passengers,
            trip.price,
            self.policy.currency.clone(),
            now,
            self.policy.hold_duration,
        )?;
        let seat_numbers = booking.seat_numbers();
        let hold_until = booking.hold_expires_at.unwrap_or(now + self.policy.hold_duration);

        self.bookings
            .create_booking(&booking)
            .await
            .map_err(internal("failed to save booking"))?;

        match self
            .claim(trip.id, &seat_numbers, &SeatClaim::hold(booking.id, hold_until), now)
            .await
        {
            Ok(ClaimOutcome::Claimed) => {}
            Ok(ClaimOutcome::Rejected { seat_number }) => {
                info!(
                    "Seat {} on trip {} was taken concurrently, abandoning booking {}",
                    seat_number, trip.id, booking.id
                );
                self.abandon(&booking, now).await;
                return Err(CoreError::Conflict(ConflictReason::SeatUnavailable(seat_number)));
            }
            Err(e) => {
                self.abandon(&booking, now).await;
                return Err(e);
            }
        }

        let update = BookingUpdate::status(BookingStatus::Held);
        let held = match self
            .bookings
            .update_booking_status(booking.id, &[BookingStatus::Pending], &update, now)
            .await
        {
            Ok(held) => held,
            Err(e) => {
                error!("Failed to mark booking {} held: {}", booking.id, e);
                self.abandon(&booking, now).await;
                return Err(CoreError::InternalError("failed to update booking".to_string()));
            }
        };

        if !held {
            // Something moved the booking first. A fast confirmation is the
            // only path that leaves it usable.
            let current = self.load_booking(booking.id).await?;
            if current.status != BookingStatus::Confirmed {
                self.abandon(&booking, now).await;
                return Err(CoreError::InternalError("booking changed while seats were held".to_string()));
            }
            booking = current;
        } else {
            booking.apply_update(&update, now)?;
            info!(
                "Booking {} holds {} seat(s) on trip {} until {}",
                booking.id,
                seat_numbers.len(),
                trip.id,
                hold_until
            );
            self.publish(ReservationEvent::SeatsHeld {
                trip_id: trip.id,
                booking_id: booking.id,
                seat_numbers,
                hold_expires_at: hold_until,
            });
        }

        Ok(ReservationReceipt {
            seat_count: booking.seat_count(),
            total_amount: booking.total_amount,
            booking,
        })
    }

    /// Charge the booking and commit its held seats.
    ///
    /// Seats already booked by this booking (an earlier attempt committed them
    /// but never recorded the confirmation) are finished with this charge.
    pub async fn confirm_payment(&self, booking_id: &str, user_id: &str) -> CoreResult<Booking> {
        let id = parse_id(Entity::Booking, booking_id)?;
        let user = UserId::parse(user_id)?;
        let booking = self.load_booking(id).await?;
        ensure_owner(&booking, &user)?;
        ensure_open(&booking)?;

        let now = self.clock.now();
        if booking.is_hold_lapsed(now) {
            info!("Hold on booking {} lapsed before payment", booking.id);
            if self.expire_booking(&booking).await? {
                return Err(CoreError::InvalidState(StateReason::HoldExpired));
            }
            match self.load_booking(id).await?.status {
                BookingStatus::Confirmed => return Err(CoreError::InvalidState(StateReason::AlreadyPaid)),
                BookingStatus::Cancelled | BookingStatus::Expired => {
                    return Err(CoreError::InvalidState(StateReason::HoldExpired))
                }
                BookingStatus::Pending | BookingStatus::Held => {
                    info!("Booking {} already owns its booked seats, completing payment", booking.id)
                }
            }
        }

        let ticket = self.issue_ticket_code().await?;

        let request = ChargeRequest {
            booking_id: booking.id,
            amount: booking.total_amount,
            currency: booking.currency.clone(),
        };
        let receipt = self
            .payments
            .charge(&request)
            .await
            .map_err(internal("payment gateway error"))?;

        if receipt.status != ChargeStatus::Succeeded {
            warn!("Payment declined for booking {}", booking.id);
            let update = BookingUpdate::payment_failed(booking.status, receipt.method.clone());
            if let Err(e) = self
                .bookings
                .update_booking_status(booking.id, &[booking.status], &update, now)
                .await
            {
                error!("Failed to record declined payment on booking {}: {}", booking.id, e);
            }
            return Err(CoreError::InvalidState(StateReason::PaymentDeclined));
        }

        let seat_numbers = booking.seat_numbers();
        match self
            .claim(booking.trip_id, &seat_numbers, &SeatClaim::book(booking.id), now)
            .await
        {
            Ok(ClaimOutcome::Claimed) => self.record_confirmation(&booking, &receipt, &ticket).await,
            Ok(ClaimOutcome::Rejected { seat_number }) => {
                self.resolve_lost_commit(&booking, &receipt, &ticket, &seat_number).await
            }
            Err(e) => {
                self.refund(&receipt).await;
                Err(e)
            }
        }
    }

    /// Booking with its trip summary. An open booking whose hold has lapsed
    /// is expired on the way out.
    pub async fn get_booking_details(&self, booking_id: &str, user_id: &str) -> CoreResult<BookingDetails> {
        let id = parse_id(Entity::Booking, booking_id)?;
        let user = UserId::parse(user_id)?;
        let mut booking = self.load_booking(id).await?;
        ensure_owner(&booking, &user)?;

        if booking.is_hold_lapsed(self.clock.now()) {
            match self.expire_booking(&booking).await {
                Ok(true) => booking = self.load_booking(id).await?,
                Ok(false) => {}
                Err(e) => warn!("Lazy expiry of booking {} failed: {}", booking.id, e),
            }
        }

        self.with_trip(booking).await
    }

    pub async fn cancel_reservation(&self, booking_id: &str, user_id: &str) -> CoreResult<Booking> {
        let id = parse_id(Entity::Booking, booking_id)?;
        let user = UserId::parse(user_id)?;
        let booking = self.load_booking(id).await?;
        ensure_owner(&booking, &user)?;
        ensure_open(&booking)?;

        if !self.release_and_close(&booking, BookingStatus::Cancelled).await? {
            // Either a confirmation holds the seats or expiry closed it first.
            let current = self.load_booking(id).await?;
            return Err(CoreError::InvalidState(match current.status {
                BookingStatus::Cancelled | BookingStatus::Expired => StateReason::BookingClosed,
                _ => StateReason::AlreadyPaid,
            }));
        }

        self.load_booking(id).await
    }

    pub async fn list_bookings(&self, user_id: &str) -> CoreResult<Vec<Booking>> {
        let user = UserId::parse(user_id)?;
        self.bookings
            .list_bookings_for_user(user.as_str())
            .await
            .map_err(internal("failed to list bookings"))
    }

    pub async fn get_ticket(&self, code: &str, user_id: &str) -> CoreResult<BookingDetails> {
        let code: TicketCode = code.parse()?;
        let user = UserId::parse(user_id)?;
        let booking = self
            .bookings
            .get_booking_by_ticket_code(code.as_str())
            .await
            .map_err(internal("failed to load ticket"))?
            .ok_or(CoreError::NotFound(Entity::Ticket))?;
        ensure_owner(&booking, &user)?;
        self.with_trip(booking).await
    }

    pub(crate) fn publish(&self, event: ReservationEvent) {
        if let Some(events) = &self.events {
            // No subscribers is fine.
            let _ = events.send(event);
        }
    }

    pub(crate) async fn load_booking(&self, id: Uuid) -> CoreResult<Booking> {
        self.bookings
            .get_booking(id)
            .await
            .map_err(internal("failed to load booking"))?
            .ok_or(CoreError::NotFound(Entity::Booking))
    }

    async fn load_trip(&self, id: Uuid) -> CoreResult<Trip> {
        self.catalog
            .get_trip(id)
            .await
            .map_err(internal("failed to load trip"))?
            .ok_or(CoreError::NotFound(Entity::Trip))
    }

    async fn with_trip(&self, booking: Booking) -> CoreResult<BookingDetails> {
        let trip = self
            .catalog
            .get_trip(booking.trip_id)
            .await
            .map_err(internal("failed to load trip"))?
            .map(|t| t.summary());
        Ok(BookingDetails { booking, trip })
    }

    /// Single seats go through the row-level compare-and-swap; larger
    /// bookings need the all-or-nothing path.
    async fn claim(
        &self,
        trip_id: Uuid,
        seat_numbers: &[String],
        claim: &SeatClaim,
        now: DateTime<Utc>,
    ) -> CoreResult<ClaimOutcome> {
        if let [only] = seat_numbers {
            let claimed = self
                .catalog
                .try_claim_seat(trip_id, only, claim, now)
                .await
                .map_err(internal("seat claim failed"))?;
            return Ok(if claimed {
                ClaimOutcome::Claimed
            } else {
                ClaimOutcome::Rejected {
                    seat_number: only.clone(),
                }
            });
        }
        self.catalog
            .claim_seats(trip_id, seat_numbers, claim, now)
            .await
            .map_err(internal("seat claim failed"))
    }

    /// Undo a reservation that never reached `held`. Best effort; anything
    /// left behind is picked up by the expiry sweep once the hold lapses.
    async fn abandon(&self, booking: &Booking, now: DateTime<Utc>) {
        let seat_numbers = booking.seat_numbers();
        match self
            .catalog
            .release_seats(booking.trip_id, &seat_numbers, booking.id)
            .await
        {
            Ok(ReleaseOutcome::Released { count }) if count > 0 => {
                self.publish(ReservationEvent::SeatsReleased {
                    trip_id: booking.trip_id,
                    booking_id: booking.id,
                    seat_numbers,
                    reason: ReleaseReason::ClaimRejected,
                });
            }
            Ok(_) => {}
            Err(e) => error!("Failed to release seats of abandoned booking {}: {}", booking.id, e),
        }

        let update = BookingUpdate::status(BookingStatus::Cancelled);
        if let Err(e) = self
            .bookings
            .update_booking_status(booking.id, &[BookingStatus::Pending], &update, now)
            .await
        {
            error!("Failed to cancel abandoned booking {}: {}", booking.id, e);
        }
    }

    /// Final step of a payment: the seats are booked by `booking`, move the
    /// booking to `confirmed`. The charge is refunded unless this call is the
    /// one that confirmed it.
    async fn record_confirmation(
        &self,
        booking: &Booking,
        receipt: &ChargeReceipt,
        ticket: &TicketCode,
    ) -> CoreResult<Booking> {
        let update = BookingUpdate::confirmed(
            receipt.method.clone(),
            receipt.transaction_id.clone(),
            ticket.to_string(),
        );
        let confirmed = match self
            .bookings
            .update_booking_status(booking.id, &OPEN, &update, self.clock.now())
            .await
        {
            Ok(confirmed) => confirmed,
            Err(e) => {
                error!(
                    "Failed to confirm booking {}, its seats stay booked until a retry: {}",
                    booking.id, e
                );
                self.refund(receipt).await;
                return Err(CoreError::InternalError("failed to confirm booking".to_string()));
            }
        };

        if !confirmed {
            self.refund(receipt).await;
            let current = self.load_booking(booking.id).await?;
            if current.status == BookingStatus::Confirmed {
                info!("Booking {} was confirmed by a concurrent request", booking.id);
                return Err(CoreError::InvalidState(StateReason::AlreadyPaid));
            }
            error!(
                "Seats of booking {} are booked but the booking is {}",
                booking.id,
                current.status.as_str()
            );
            return Err(CoreError::InternalError("booking changed during confirmation".to_string()));
        }

        info!("Booking {} confirmed with ticket {}", booking.id, ticket);
        self.publish(ReservationEvent::BookingConfirmed {
            trip_id: booking.trip_id,
            booking_id: booking.id,
            seat_numbers: booking.seat_numbers(),
            ticket_code: ticket.to_string(),
        });
        self.load_booking(booking.id).await
    }

    /// The held -> booked claim was refused after the charge went through.
    async fn resolve_lost_commit(
        &self,
        booking: &Booking,
        receipt: &ChargeReceipt,
        ticket: &TicketCode,
        seat_number: &str,
    ) -> CoreResult<Booking> {
        let seat_numbers = booking.seat_numbers();
        let committed = match self.catalog.get_trip(booking.trip_id).await {
            Ok(Some(trip)) => trip
                .seats
                .all_in_state(&seat_numbers, SeatStatus::Booked, booking.id),
            Ok(None) => false,
            Err(e) => {
                error!("Failed to reload trip {}: {}", booking.trip_id, e);
                self.refund(receipt).await;
                return Err(CoreError::InternalError("failed to load trip".to_string()));
            }
        };

        if committed {
            // Either a concurrent payment is about to confirm, or an earlier
            // attempt booked the seats and failed before confirming.
            return self.record_confirmation(booking, receipt, ticket).await;
        }

        self.refund(receipt).await;
        warn!(
            "Booking {} lost seat {} before payment completed",
            booking.id, seat_number
        );
        if let Err(e) = self.release_and_close(booking, BookingStatus::Expired).await {
            error!("Failed to expire booking {}: {}", booking.id, e);
        }
        Err(CoreError::InvalidState(StateReason::HoldExpired))
    }

    /// Release what the booking still holds and move it to a closed status.
    /// Returns false if a committed seat or a concurrent transition got there first.
    pub(crate) async fn release_and_close(&self, booking: &Booking, status: BookingStatus) -> CoreResult<bool> {
        let now = self.clock.now();
        let seat_numbers = booking.seat_numbers();
        match self
            .catalog
            .release_seats(booking.trip_id, &seat_numbers, booking.id)
            .await
            .map_err(internal("failed to release seats"))?
        {
            ReleaseOutcome::Committed => {
                warn!(
                    "Booking {} has booked seats but is still {}; not closing it",
                    booking.id,
                    booking.status.as_str()
                );
                return Ok(false);
            }
            ReleaseOutcome::Released { count } => {
                debug!("Released {} seat(s) of booking {}", count, booking.id)
            }
        }

        let closed = self
            .bookings
            .update_booking_status(booking.id, &OPEN, &BookingUpdate::status(status), now)
            .await
            .map_err(internal("failed to update booking"))?;
        if closed {
            info!("Booking {} is now {}", booking.id, status.as_str());
            self.publish(ReservationEvent::SeatsReleased {
                trip_id: booking.trip_id,
                booking_id: booking.id,
                seat_numbers,
                reason: if status == BookingStatus::Cancelled {
                    ReleaseReason::Cancelled
                } else {
                    ReleaseReason::Expired
                },
            });
        }
        Ok(closed)
    }

    async fn refund(&self, receipt: &ChargeReceipt) {
        if let Err(e) = self.payments.refund(&receipt.transaction_id).await {
            error!("Refund of {} failed: {}", receipt.transaction_id, e);
        }
    }

    async fn issue_ticket_code(&self) -> CoreResult<TicketCode> {
        for _ in 0..TICKET_CODE_ATTEMPTS {
            let code = TicketCode::generate();
            let existing = self
                .bookings
                .get_booking_by_ticket_code(code.as_str())
                .await
                .map_err(internal("failed to check ticket code"))?;
            if existing.is_none() {
                return Ok(code);
            }
            warn!("Ticket code {} already issued, regenerating", code);
        }
        Err(CoreError::InternalError("could not allocate a ticket code".to_string()))
    }
}

fn first_unavailable(trip: &Trip, passengers: &[PassengerSeat], now: DateTime<Utc>) -> Option<String> {
    passengers
        .iter()
        .find(|p| {
            !trip
                .seats
                .get(&p.seat_number)
                .map(|s| s.is_claimable(now))
                .unwrap_or(false)
        })
        .map(|p| p.seat_number.clone())
}

fn ensure_owner(booking: &Booking, user: &UserId) -> CoreResult<()> {
    if booking.is_owned_by(user.as_str()) {
        Ok(())
    } else {
        Err(CoreError::Forbidden("booking belongs to another user".to_string()))
    }
}

fn ensure_open(booking: &Booking) -> CoreResult<()> {
    match booking.status {
        BookingStatus::Confirmed => Err(CoreError::InvalidState(StateReason::AlreadyPaid)),
        BookingStatus::Cancelled | BookingStatus::Expired => {
            Err(CoreError::InvalidState(StateReason::BookingClosed))
        }
        BookingStatus::Pending | BookingStatus::Held => Ok(()),
    }
}

/// Storage failures are logged here and surface as a generic internal error.
fn internal(context: &'static str) -> impl FnOnce(StoreError) -> CoreError {
    move |e| {
        error!("{}: {}", context, e);
        CoreError::InternalError(context.to_string())
    }
}
