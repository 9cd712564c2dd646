//! Allo v2 live tables, event by event through the engine.

mod support;

use chainproject_allo::layouts::{
    LTIP_HEDGEY_INIT, LTIP_REGISTRATION_OPEN, MERKLE_INIT, MERKLE_REGISTRATION_ANCHORED, MERKLE_REGISTRATION_OPEN,
    RFP_COMMITTEE_INIT, RFP_REGISTRATION_ANCHORED, RFP_REGISTRATION_OPEN, RFP_SIMPLE_INIT,
};
use chainproject_allo::{LtipHedgeyGovernor, LtipRecipient, MerklePool, MerkleRecipient, RfpPool, RfpRecipient, RoleAccount};
use chainproject_core::{ApplyOutcome, EntityStore, Event, Metadata, ProjectionError, Status, Value};

use support::*;

// ─── Event builders ───────────────────────────────────────────────────────────

fn rfp_initialized(w: &World, max_bid: u128, use_registry_anchor: bool, metadata_required: bool) -> Event {
    w.event(RFP_STRATEGY, "allov2.RFPSimpleStrategy.Initialized").with(
        "data",
        payload(
            &RFP_SIMPLE_INIT,
            &[Value::Uint(max_bid), Value::Bool(use_registry_anchor), Value::Bool(metadata_required)],
        ),
    )
}

fn rfp_registered_open(w: &World, recipient: u8, bid: u128) -> Event {
    w.event(RFP_STRATEGY, "allov2.RFPSimpleStrategy.Registered")
        .with("recipientId", address(recipient))
        .with("sender", address(0x5e))
        .with(
            "data",
            payload(
                &RFP_REGISTRATION_OPEN,
                &[address(0x22), zero(), Value::Uint(bid), metadata(1, "ipfs://x")],
            ),
        )
}

fn ltip_initialized(w: &World, voting_threshold: u128, registry_gating: bool) -> Event {
    let params = Value::Tuple(vec![
        Value::Bool(registry_gating),
        Value::Bool(true),
        Value::Uint(voting_threshold),
        Value::Uint(1_000),
        Value::Uint(2_000),
        Value::Uint(2_000),
        Value::Uint(3_000),
        Value::Uint(3_000),
        Value::Uint(4_000),
        Value::Uint(4_000),
        Value::Uint(5_000),
        Value::Uint(86_400),
    ]);
    w.event(LTIP_STRATEGY, "allov2.LTIPHedgeyGovernorStrategy.Initialized").with(
        "data",
        payload(
            &LTIP_HEDGEY_INIT,
            &[address(0x60), Value::Uint(123), address(0x61), address(0x62), Value::Bool(false), params],
        ),
    )
}

fn ltip_event(w: &World, name: &str) -> Event {
    w.event(LTIP_STRATEGY, &format!("allov2.LTIPHedgeyGovernorStrategy.{name}"))
}

fn merkle_event(w: &World, name: &str) -> Event {
    w.event(
        MERKLE_STRATEGY,
        &format!("allov2.DonationVotingMerkleDistributionDirectTransferStrategy.{name}"),
    )
}

fn merkle_initialized(w: &World, use_registry_anchor: bool) -> Event {
    merkle_event(w, "Initialized").with(
        "data",
        payload(
            &MERKLE_INIT,
            &[
                Value::Bool(use_registry_anchor),
                Value::Bool(true),
                Value::Uint(10),
                Value::Uint(20),
                Value::Uint(30),
                Value::Uint(40),
                Value::Array(vec![address(0xee), address(0xef)]),
            ],
        ),
    )
}

// ─── RFP ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn rfp_registration_decodes_the_open_layout() {
    let w = World::new();
    w.engine.apply(&rfp_initialized(&w, 100, false, true)).await.unwrap();
    w.engine.apply(&rfp_registered_open(&w, 0x11, 50)).await.unwrap();

    let pool: RfpPool = w.only().await;
    assert_eq!(pool.pool_id, "7");
    assert_eq!(pool.max_bid, 100);
    assert!(!pool.use_registry_anchor);
    assert!(pool.metadata_required);
    assert!(!pool.committee);
    assert_eq!(pool.strategy, RFP_STRATEGY);

    let r: RfpRecipient = w.only().await;
    assert_eq!(r.recipient_id, addr(0x11));
    assert_eq!(r.proposal_bid, 50);
    assert_eq!(r.metadata, Metadata::new(1, "ipfs://x"));
    assert_eq!(r.recipient_address, Some(addr(0x22)));
    assert!(!r.is_using_registry_anchor);
    assert_eq!(r.status, Status::Pending);
    assert_eq!(r.sender, Some(addr(0x5e)));
}

#[tokio::test]
async fn repeated_initialized_keeps_one_configuration_row() {
    let w = World::new();
    for max_bid in [100, 100, 250] {
        let outcome = w.engine.apply(&rfp_initialized(&w, max_bid, false, true)).await.unwrap();
        assert!(matches!(outcome, ApplyOutcome::Applied { .. }));
    }
    let pool: RfpPool = w.only().await;
    assert_eq!(pool.max_bid, 250);
}

#[tokio::test]
async fn redelivered_registration_is_idempotent() {
    let w = World::new();
    w.engine.apply(&rfp_initialized(&w, 100, false, true)).await.unwrap();
    let registration = rfp_registered_open(&w, 0x11, 50);

    w.engine.apply(&registration).await.unwrap();
    let once = w.store.rows(&chainproject_allo::rfp::RFP_RECIPIENT).await.unwrap();
    w.engine.apply(&registration).await.unwrap();
    let twice = w.store.rows(&chainproject_allo::rfp::RFP_RECIPIENT).await.unwrap();
    assert_eq!(once, twice);
    assert_eq!(twice.len(), 1);
}

#[tokio::test]
async fn registration_before_initialization_is_rejected() {
    let w = World::new();
    let err = w.engine.apply(&rfp_registered_open(&w, 0x11, 50)).await.unwrap_err();
    assert!(matches!(err, ProjectionError::MissingReferencedEntity { ref table, .. } if table == "RFPPool"));
    assert!(w.rows::<RfpRecipient>().await.is_empty());
}

#[tokio::test]
async fn anchored_pool_rejects_open_payloads() {
    let w = World::new();
    w.engine.apply(&rfp_initialized(&w, 100, true, false)).await.unwrap();

    let err = w.engine.apply(&rfp_registered_open(&w, 0x11, 50)).await.unwrap_err();
    assert!(matches!(err, ProjectionError::SchemaMismatch { ref layout, .. } if layout == "RFP.Registration.Anchored"));
    assert!(w.rows::<RfpRecipient>().await.is_empty());

    let anchored = w
        .event(RFP_STRATEGY, "allov2.RFPSimpleStrategy.Registered")
        .with("recipientId", address(0x11))
        .with(
            "data",
            payload(&RFP_REGISTRATION_ANCHORED, &[address(0x11), Value::Uint(60), metadata(1, "ipfs://y")]),
        );
    w.engine.apply(&anchored).await.unwrap();
    let r: RfpRecipient = w.only().await;
    assert!(r.is_using_registry_anchor);
    assert_eq!(r.recipient_address, None);
    assert_eq!(r.proposal_bid, 60);
}

#[tokio::test]
async fn committee_initialization_flattens_nested_params() {
    let w = World::new();
    let init = w.event(RFP_STRATEGY, "allov2.RFPCommitteeStrategy.Initialized").with(
        "data",
        payload(
            &RFP_COMMITTEE_INIT,
            &[
                Value::Uint(3),
                Value::Tuple(vec![Value::Uint(500), Value::Bool(true), Value::Bool(false)]),
            ],
        ),
    );
    w.engine.apply(&init).await.unwrap();

    let pool: RfpPool = w.only().await;
    assert!(pool.committee);
    assert_eq!(pool.vote_threshold, 3);
    assert_eq!(pool.max_bid, 500);
    assert!(pool.use_registry_anchor);
}

#[tokio::test]
async fn rfp_pool_updates_and_allocation() {
    let w = World::new();
    w.engine.apply(&rfp_initialized(&w, 100, false, true)).await.unwrap();
    w.engine.apply(&rfp_registered_open(&w, 0x11, 50)).await.unwrap();

    let bump = w
        .event(RFP_STRATEGY, "allov2.RFPSimpleStrategy.MaxBidIncreased")
        .with("maxBid", 400u64);
    w.engine.apply(&bump).await.unwrap();
    let active = w
        .event(RFP_STRATEGY, "allov2.RFPSimpleStrategy.PoolActive")
        .with("active", true);
    w.engine.apply(&active).await.unwrap();

    let allocated = w
        .event(RFP_STRATEGY, "allov2.RFPSimpleStrategy.Allocated")
        .with("recipientId", address(0x11))
        .with("amount", 50u64);
    w.engine.apply(&allocated).await.unwrap();

    // Allocation to an unknown recipient touches nothing.
    let stray = w
        .event(RFP_STRATEGY, "allov2.RFPSimpleStrategy.Allocated")
        .with("recipientId", address(0x99))
        .with("amount", 1u64);
    assert_eq!(
        w.engine.apply(&stray).await.unwrap(),
        ApplyOutcome::Applied { routes: 0, writes: 0 }
    );

    let pool: RfpPool = w.only().await;
    assert_eq!(pool.max_bid, 400);
    assert!(pool.active);
    let r: RfpRecipient = w.only().await;
    assert_eq!(r.status, Status::Accepted);
}

// ─── RoleAccount ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn role_revocation_is_a_soft_delete() {
    let w = World::new();
    let a1 = address(0xa1);
    let granted = w
        .event(ALLO, "allov2.Allo.RoleGranted")
        .with("role", "admin")
        .with("account", a1.clone());
    let revoked = w
        .event(ALLO, "allov2.Allo.RoleRevoked")
        .with("role", "admin")
        .with("account", a1);

    w.engine.apply(&granted).await.unwrap();
    assert!(w.only::<RoleAccount>().await.is_active);
    w.engine.apply(&revoked).await.unwrap();

    let row: RoleAccount = w.only().await;
    assert_eq!(
        row,
        RoleAccount {
            role_id: "admin".into(),
            account_id: addr(0xa1),
            chain_id: CHAIN,
            is_active: false,
        }
    );
}

#[tokio::test]
async fn bytes32_roles_key_by_hex() {
    let w = World::new();
    let granted = w
        .event(ALLO, "allov2.Registry.RoleGranted")
        .with("role", Value::Bytes(vec![0xab; 32]))
        .with("account", address(0xa2));
    w.engine.apply(&granted).await.unwrap();
    let row: RoleAccount = w.only().await;
    assert_eq!(row.role_id, format!("0x{}", "ab".repeat(32)));
}

// ─── LTIP Hedgey Governor ─────────────────────────────────────────────────────

async fn ltip_with_recipient(w: &World) {
    w.engine.apply(&ltip_initialized(w, 5, false)).await.unwrap();
    let registered = ltip_event(w, "Registered")
        .with("recipientId", address(0x11))
        .with("sender", address(0x5e))
        .with(
            "data",
            payload(
                &LTIP_REGISTRATION_OPEN,
                &[address(0x22), zero(), Value::Uint(1_000), metadata(1, "ipfs://ltip")],
            ),
        );
    w.engine.apply(&registered).await.unwrap();
}

#[tokio::test]
async fn ltip_initialization_and_registration() {
    let w = World::new();
    ltip_with_recipient(&w).await;

    let pool: LtipHedgeyGovernor = w.only().await;
    assert_eq!(pool.pool_id, "8");
    assert_eq!(pool.governor_contract, addr(0x60));
    assert_eq!(pool.voting_block, 123);
    assert_eq!(pool.vesting_admin, addr(0x62));
    assert_eq!(pool.voting_threshold, 5);
    assert_eq!(pool.review_end_time, 3_000);
    assert_eq!(pool.vesting_period, 86_400);
    assert!(!pool.registry_gating);

    let r: LtipRecipient = w.only().await;
    assert_eq!(r.recipient_address, addr(0x22));
    assert_eq!(r.allocation_amount, 1_000);
    assert_eq!(r.metadata_pointer, "ipfs://ltip");
    assert_eq!(r.status, Status::Pending);
    assert_eq!(r.strategy, LTIP_STRATEGY);
}

#[tokio::test]
async fn ltip_pool_field_updates() {
    let w = World::new();
    w.engine.apply(&ltip_initialized(&w, 5, false)).await.unwrap();
    for ev in [
        ltip_event(&w, "PoolActive").with("active", true),
        ltip_event(&w, "AllocationPeriodExtended").with("allocationEndTime", 9_999u64),
        ltip_event(&w, "AdminAddressUpdated").with("adminAddress", address(0x77)),
        ltip_event(&w, "AdminTransferOBOUpdated").with("adminTransferOBO", true),
        ltip_event(&w, "VotingBlockUpdated").with("blockNumber", 456u64),
    ] {
        w.engine.apply(&ev).await.unwrap();
    }
    let pool: LtipHedgeyGovernor = w.only().await;
    assert!(pool.active);
    assert_eq!(pool.allocation_end_time, 9_999);
    assert_eq!(pool.vesting_admin, addr(0x77));
    assert!(pool.admin_transfer_obo);
    assert_eq!(pool.voting_block, 456);
}

#[tokio::test]
async fn vote_revocation_reads_the_current_threshold() {
    let w = World::new();
    w.reader.set(CHAIN, LTIP_STRATEGY, "votingThreshold", 5u64);
    ltip_with_recipient(&w).await;

    let allocated = ltip_event(&w, "Allocated")
        .with("recipientId", address(0x11))
        .with("amount", 1_000u64)
        .with("votes", 6u64);
    w.engine.apply(&allocated).await.unwrap();
    assert_eq!(w.only::<LtipRecipient>().await.status, Status::Accepted);

    let revoke = |w: &World| {
        ltip_event(w, "VotesRevoked")
            .with("recipient", address(0x11))
            .with("votes", 4u64)
    };
    w.engine.apply(&revoke(&w)).await.unwrap();
    let r: LtipRecipient = w.only().await;
    assert_eq!((r.votes, r.status), (4, Status::Pending));

    // The strategy lowered its threshold; the same vote count now passes.
    w.reader.set(CHAIN, LTIP_STRATEGY, "votingThreshold", 3u64);
    w.engine.apply(&revoke(&w)).await.unwrap();
    let r: LtipRecipient = w.only().await;
    assert_eq!((r.votes, r.status), (4, Status::Accepted));
}

#[tokio::test]
async fn recipient_lifecycle_statuses() {
    let w = World::new();
    ltip_with_recipient(&w).await;

    let vesting = ltip_event(&w, "VestingPlanCreated")
        .with("recipientId", address(0x11))
        .with("vestingContract", address(0x70))
        .with("tokenId", 42u64);
    w.engine.apply(&vesting).await.unwrap();
    let r: LtipRecipient = w.only().await;
    assert_eq!(r.vesting_contract, Some(addr(0x70)));
    assert_eq!(r.token_id, 42);

    let status = ltip_event(&w, "RecipientStatusUpdated")
        .with("recipientId", address(0x11))
        .with("status", 5u64);
    w.engine.apply(&status).await.unwrap();
    assert_eq!(w.only::<LtipRecipient>().await.status, Status::InReview);

    for (name, expected) in [
        ("Distributed", Status::Rejected),
        ("AllocationRevoked", Status::Canceled),
        ("Canceled", Status::Canceled),
    ] {
        let ev = ltip_event(&w, name).with("recipientId", address(0x11));
        w.engine.apply(&ev).await.unwrap();
        assert_eq!(w.only::<LtipRecipient>().await.status, expected, "{name}");
    }
}

#[tokio::test]
async fn loose_references_to_unknown_recipients_are_noops() {
    let w = World::new();
    w.engine.apply(&ltip_initialized(&w, 5, false)).await.unwrap();

    let vesting = ltip_event(&w, "VestingPlanCreated")
        .with("recipientId", address(0x99))
        .with("vestingContract", address(0x70))
        .with("tokenId", 1u64);
    w.engine.apply(&vesting).await.unwrap();
    assert!(w.rows::<LtipRecipient>().await.is_empty());
}

#[tokio::test]
async fn out_of_range_status_codes_fail_the_event() {
    let w = World::new();
    ltip_with_recipient(&w).await;
    let status = ltip_event(&w, "RecipientStatusUpdated")
        .with("recipientId", address(0x11))
        .with("status", 9u64);
    let err = w.engine.apply(&status).await.unwrap_err();
    assert!(matches!(err, ProjectionError::UnknownStatus(9)));
    assert_eq!(w.only::<LtipRecipient>().await.status, Status::Pending);
}

#[tokio::test]
async fn missing_pool_id_is_transient() {
    let w = World::new();
    let ev = w
        .event("0x00000000000000000000000000000000000000dd", "allov2.RFPSimpleStrategy.PoolActive")
        .with("active", true);
    let err = w.engine.apply(&ev).await.unwrap_err();
    assert!(err.is_retryable());
}

// ─── Donation Voting Merkle ───────────────────────────────────────────────────

#[tokio::test]
async fn merkle_pool_and_anchored_registration() {
    let w = World::new();
    w.engine.apply(&merkle_initialized(&w, true)).await.unwrap();

    let registered = merkle_event(&w, "Registered")
        .with("recipientId", address(0x11))
        .with(
            "data",
            payload(&MERKLE_REGISTRATION_ANCHORED, &[address(0x11), address(0x33), metadata(1, "ipfs://m")]),
        );
    w.engine.apply(&registered).await.unwrap();

    let timestamps = merkle_event(&w, "TimestampsUpdated")
        .with("registrationStartTime", 11u64)
        .with("registrationEndTime", 21u64)
        .with("allocationStartTime", 31u64)
        .with("allocationEndTime", 41u64);
    w.engine.apply(&timestamps).await.unwrap();

    let pool: MerklePool = w.only().await;
    assert_eq!(pool.allowed_tokens, vec![addr(0xee), addr(0xef)]);
    assert_eq!(
        (pool.registration_start_time, pool.allocation_end_time),
        (11, 41)
    );

    let r: MerkleRecipient = w.only().await;
    assert!(r.is_using_registry_anchor);
    assert_eq!(r.recipient_address, addr(0x33));
    assert_eq!(r.metadata, Metadata::new(1, "ipfs://m"));
    assert_eq!(r.status, Status::Pending);
}

#[tokio::test]
async fn merkle_anchored_registration_requires_a_clean_address_word() {
    let w = World::new();
    w.engine.apply(&merkle_initialized(&w, true)).await.unwrap();

    let Value::Bytes(mut data) = payload(
        &MERKLE_REGISTRATION_ANCHORED,
        &[address(0x11), address(0x33), metadata(1, "ipfs://m")],
    ) else {
        unreachable!()
    };
    // Set bits above the 160-bit address in the second head word.
    data[32] = 0x01;
    let registered = merkle_event(&w, "Registered")
        .with("recipientId", address(0x11))
        .with("data", Value::Bytes(data));

    let err = w.engine.apply(&registered).await.unwrap_err();
    assert!(matches!(
        err,
        ProjectionError::SchemaMismatch { ref layout, .. } if layout == "DonationVotingMerkle.Registration.Anchored"
    ));
    assert!(w.rows::<MerkleRecipient>().await.is_empty());
}

#[tokio::test]
async fn merkle_open_registration_then_update() {
    let w = World::new();
    w.engine.apply(&merkle_initialized(&w, false)).await.unwrap();

    let registered = merkle_event(&w, "Registered")
        .with("recipientId", address(0x11))
        .with(
            "data",
            payload(&MERKLE_REGISTRATION_OPEN, &[address(0x33), address(0x44), metadata(1, "ipfs://a")]),
        );
    w.engine.apply(&registered).await.unwrap();

    let r: MerkleRecipient = w.only().await;
    assert!(r.is_using_registry_anchor);
    assert_eq!(r.recipient_address, addr(0x33));
    assert_eq!(r.metadata, Metadata::new(1, "ipfs://a"));
    assert_eq!(r.sender, None);

    let updated = merkle_event(&w, "UpdatedRegistration")
        .with("recipientId", address(0x11))
        .with("sender", address(0x5e))
        .with(
            "data",
            payload(&MERKLE_REGISTRATION_OPEN, &[address(0x34), zero(), metadata(2, "ipfs://b")]),
        );
    w.engine.apply(&updated).await.unwrap();

    let r: MerkleRecipient = w.only().await;
    assert_eq!(r.recipient_id, addr(0x11));
    assert!(!r.is_using_registry_anchor);
    assert_eq!(r.recipient_address, addr(0x34));
    assert_eq!(r.metadata, Metadata::new(2, "ipfs://b"));
    assert_eq!(r.status, Status::Pending);
    assert_eq!(r.sender, Some(addr(0x5e)));
}
