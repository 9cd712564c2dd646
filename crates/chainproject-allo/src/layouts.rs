//! Payload layouts of the Allo v2 strategies and the selectors that pick them.
//!
//! Strategy `initialize` and `registerRecipient` calls carry an opaque
//! `bytes data` argument whose shape depends on the strategy and, for
//! registrations, on the pool's `useRegistryAnchor` flag. Each selector enum
//! below maps every one of its values to exactly one layout.

use chainproject_core::{FieldSpec, FieldType, Layout, Selector};

// ─── Anchoring ────────────────────────────────────────────────────────────────

/// Whether a pool identifies recipients by their registry anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchoring {
    RegistryAnchor,
    Open,
}

impl Anchoring {
    pub fn from_flag(use_registry_anchor: bool) -> Self {
        if use_registry_anchor {
            Anchoring::RegistryAnchor
        } else {
            Anchoring::Open
        }
    }

    pub fn is_anchored(self) -> bool {
        self == Anchoring::RegistryAnchor
    }
}

// ─── RFP ──────────────────────────────────────────────────────────────────────

const RFP_PARAMS: &[FieldSpec] = &[
    FieldSpec::new("maxBid", FieldType::Uint(256)),
    FieldSpec::new("useRegistryAnchor", FieldType::Bool),
    FieldSpec::new("metadataRequired", FieldType::Bool),
];

pub static RFP_SIMPLE_INIT: Layout = Layout {
    name: "RFPSimple.Initialize",
    fields: RFP_PARAMS,
};

pub static RFP_COMMITTEE_INIT: Layout = Layout {
    name: "RFPCommittee.Initialize",
    fields: &[
        FieldSpec::new("voteThreshold", FieldType::Uint(256)),
        FieldSpec::new("params", FieldType::Struct(RFP_PARAMS)),
    ],
};

pub static RFP_REGISTRATION_ANCHORED: Layout = Layout {
    name: "RFP.Registration.Anchored",
    fields: &[
        FieldSpec::new("recipientId", FieldType::Address),
        FieldSpec::new("proposalBid", FieldType::Uint(256)),
        FieldSpec::new("metadata", FieldType::Metadata),
    ],
};

pub static RFP_REGISTRATION_OPEN: Layout = Layout {
    name: "RFP.Registration.Open",
    fields: &[
        FieldSpec::new("recipientAddress", FieldType::Address),
        FieldSpec::new("registryAnchor", FieldType::Address),
        FieldSpec::new("proposalBid", FieldType::Uint(256)),
        FieldSpec::new("metadata", FieldType::Metadata),
    ],
};

/// RFP strategy flavour, taken from the event's contract type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfpInit {
    Simple,
    Committee,
}

impl RfpInit {
    pub const SIMPLE_CONTRACT: &'static str = "RFPSimpleStrategy";
    pub const COMMITTEE_CONTRACT: &'static str = "RFPCommitteeStrategy";

    pub fn from_contract_type(contract_type: &str) -> Option<Self> {
        match contract_type {
            Self::SIMPLE_CONTRACT => Some(RfpInit::Simple),
            Self::COMMITTEE_CONTRACT => Some(RfpInit::Committee),
            _ => None,
        }
    }
}

impl Selector for RfpInit {
    fn layout(self) -> &'static Layout {
        match self {
            RfpInit::Simple => &RFP_SIMPLE_INIT,
            RfpInit::Committee => &RFP_COMMITTEE_INIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RfpRegistration(pub Anchoring);

impl Selector for RfpRegistration {
    fn layout(self) -> &'static Layout {
        match self.0 {
            Anchoring::RegistryAnchor => &RFP_REGISTRATION_ANCHORED,
            Anchoring::Open => &RFP_REGISTRATION_OPEN,
        }
    }
}

// ─── LTIP Hedgey Governor ─────────────────────────────────────────────────────

pub static LTIP_HEDGEY_INIT: Layout = Layout {
    name: "LTIPHedgeyGovernor.Initialize",
    fields: &[
        FieldSpec::new("governorContract", FieldType::Address),
        FieldSpec::new("votingBlock", FieldType::Uint(256)),
        FieldSpec::new("hedgeyContract", FieldType::Address),
        FieldSpec::new("vestingAdmin", FieldType::Address),
        FieldSpec::new("adminTransferOBO", FieldType::Bool),
        FieldSpec::new(
            "params",
            FieldType::Struct(&[
                FieldSpec::new("registryGating", FieldType::Bool),
                FieldSpec::new("metadataRequired", FieldType::Bool),
                FieldSpec::new("votingThreshold", FieldType::Uint(256)),
                FieldSpec::new("registrationStartTime", FieldType::Uint(64)),
                FieldSpec::new("registrationEndTime", FieldType::Uint(64)),
                FieldSpec::new("reviewStartTime", FieldType::Uint(64)),
                FieldSpec::new("reviewEndTime", FieldType::Uint(64)),
                FieldSpec::new("allocationStartTime", FieldType::Uint(64)),
                FieldSpec::new("allocationEndTime", FieldType::Uint(64)),
                FieldSpec::new("distributionStartTime", FieldType::Uint(64)),
                FieldSpec::new("distributionEndTime", FieldType::Uint(64)),
                FieldSpec::new("vestingPeriod", FieldType::Uint(64)),
            ]),
        ),
    ],
};

pub static LTIP_REGISTRATION_ANCHORED: Layout = Layout {
    name: "LTIP.Registration.Anchored",
    fields: &[
        FieldSpec::new("recipientId", FieldType::Address),
        FieldSpec::new("recipientAddress", FieldType::Address),
        FieldSpec::new("allocationAmount", FieldType::Uint(256)),
        FieldSpec::new("metadata", FieldType::Metadata),
    ],
};

pub static LTIP_REGISTRATION_OPEN: Layout = Layout {
    name: "LTIP.Registration.Open",
    fields: &[
        FieldSpec::new("recipientAddress", FieldType::Address),
        FieldSpec::new("registryAnchor", FieldType::Address),
        FieldSpec::new("allocationAmount", FieldType::Uint(256)),
        FieldSpec::new("metadata", FieldType::Metadata),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LtipRegistration(pub Anchoring);

impl Selector for LtipRegistration {
    fn layout(self) -> &'static Layout {
        match self.0 {
            Anchoring::RegistryAnchor => &LTIP_REGISTRATION_ANCHORED,
            Anchoring::Open => &LTIP_REGISTRATION_OPEN,
        }
    }
}

// ─── Donation Voting Merkle Distribution ──────────────────────────────────────

pub static MERKLE_INIT: Layout = Layout {
    name: "DonationVotingMerkle.Initialize",
    fields: &[
        FieldSpec::new("useRegistryAnchor", FieldType::Bool),
        FieldSpec::new("metadataRequired", FieldType::Bool),
        FieldSpec::new("registrationStartTime", FieldType::Uint(64)),
        FieldSpec::new("registrationEndTime", FieldType::Uint(64)),
        FieldSpec::new("allocationStartTime", FieldType::Uint(64)),
        FieldSpec::new("allocationEndTime", FieldType::Uint(64)),
        FieldSpec::new("allowedTokens", FieldType::Array(&FieldType::Address)),
    ],
};

pub static MERKLE_REGISTRATION_ANCHORED: Layout = Layout {
    name: "DonationVotingMerkle.Registration.Anchored",
    fields: &[
        FieldSpec::new("recipientId", FieldType::Address),
        FieldSpec::new("recipientAddress", FieldType::Address),
        FieldSpec::new("metadata", FieldType::Metadata),
    ],
};

pub static MERKLE_REGISTRATION_OPEN: Layout = Layout {
    name: "DonationVotingMerkle.Registration.Open",
    fields: &[
        FieldSpec::new("recipientAddress", FieldType::Address),
        FieldSpec::new("registryAnchor", FieldType::Address),
        FieldSpec::new("metadata", FieldType::Metadata),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MerkleRegistration(pub Anchoring);

impl Selector for MerkleRegistration {
    fn layout(self) -> &'static Layout {
        match self.0 {
            Anchoring::RegistryAnchor => &MERKLE_REGISTRATION_ANCHORED,
            Anchoring::Open => &MERKLE_REGISTRATION_OPEN,
        }
    }
}
