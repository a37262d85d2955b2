use std::time::Duration;

use log::{debug, warn};
use primitive_types::U256;
use serde_json::Value;
use tokio::time::timeout;

use super::{ContractCall, ContractGateway, ContractWrite, LogFilter, RawLog, TxHash};
use crate::config::GovernanceConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::types::{
    Address, GovernanceParams, ProposalId, ProposalState, TallySource, TokenAmount, TransferRecord,
    VoteReceipt, VoteRecord, VoteSupport, VoteTotals,
};

/// Typed view over a [`ContractGateway`].
///
/// Applies the per-call and per-log-query timeouts and translates every raw
/// response into the typed schema. Responses may arrive as positional tuples
/// or as objects with named fields; integers may be JSON numbers, decimal
/// strings, hex strings or `{ "hex": "0x…" }` big-number objects.
pub struct TypedGateway<'g, G: ?Sized> {
    gateway: &'g G,
    call_timeout: Duration,
    log_timeout: Duration,
}

impl<'g, G: ContractGateway + ?Sized> TypedGateway<'g, G> {
    pub fn new(gateway: &'g G, config: &GovernanceConfig) -> Self {
        Self {
            gateway,
            call_timeout: config.call_timeout(),
            log_timeout: config.log_timeout(),
        }
    }

    pub fn log_timeout(&self) -> Duration {
        self.log_timeout
    }

    async fn raw_call(&self, call: ContractCall) -> GatewayResult<Value> {
        let method = call.method();
        debug!("{:?} call {}", call.target(), method);
        match timeout(self.call_timeout, self.gateway.call(&call)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout { method, millis: self.call_timeout.as_millis() as u64 }),
        }
    }

    async fn raw_logs(&self, filter: &LogFilter) -> GatewayResult<Vec<RawLog>> {
        let method = filter.event.name();
        debug!("Fetching {} logs in blocks {}..={}", method, filter.from_block, filter.to_block);
        match timeout(self.log_timeout, self.gateway.logs(filter)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout { method, millis: self.log_timeout.as_millis() as u64 }),
        }
    }

    pub async fn block_number(&self) -> GatewayResult<u64> {
        match timeout(self.call_timeout, self.gateway.block_number()).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout {
                method: "blockNumber",
                millis: self.call_timeout.as_millis() as u64,
            }),
        }
    }

    pub async fn balance_of(&self, account: Address, snapshot_id: Option<u64>) -> GatewayResult<TokenAmount> {
        let call = ContractCall::BalanceOf { account, snapshot_id };
        let method = call.method();
        decode_amount(method, &self.raw_call(call).await?)
    }

    /// `None` when the account has no delegate (null address).
    pub async fn delegate_of(&self, account: Address) -> GatewayResult<Option<Address>> {
        let raw = self.raw_call(ContractCall::Delegates { account }).await?;
        if raw.is_null() {
            return Ok(None);
        }
        let delegate = decode_address("getDelegate", &raw)?;
        Ok(if delegate.is_zero() { None } else { Some(delegate) })
    }

    pub async fn delegators_of(&self, account: Address) -> GatewayResult<Vec<Address>> {
        let raw = self.raw_call(ContractCall::DelegatorsOf { account }).await?;
        decode_address_list("getDelegatorsOf", &raw)
    }

    pub async fn delegated_to(&self, account: Address) -> GatewayResult<TokenAmount> {
        let raw = self.raw_call(ContractCall::DelegatedTo { account }).await?;
        decode_amount("getDelegatedToAddress", &raw)
    }

    pub async fn current_snapshot_id(&self) -> GatewayResult<u64> {
        let raw = self.raw_call(ContractCall::CurrentSnapshotId).await?;
        decode_u64("getCurrentSnapshotId", &raw)
    }

    pub async fn effective_voting_power(&self, account: Address, snapshot_id: u64) -> GatewayResult<TokenAmount> {
        let raw = self.raw_call(ContractCall::EffectiveVotingPower { account, snapshot_id }).await?;
        decode_amount("getEffectiveVotingPower", &raw)
    }

    pub async fn proposal_state(&self, proposal_id: ProposalId) -> GatewayResult<ProposalState> {
        let raw = self.raw_call(ContractCall::ProposalState { proposal_id }).await?;
        let numeric = decode_u8("state", &raw)?;
        ProposalState::try_from(numeric).map_err(|reason| decode_error("state", reason))
    }

    pub async fn proposal_snapshot(&self, proposal_id: ProposalId) -> GatewayResult<u64> {
        let raw = self.raw_call(ContractCall::ProposalSnapshot { proposal_id }).await?;
        decode_u64("proposalSnapshot", &raw)
    }

    pub async fn proposal_vote_totals(&self, proposal_id: ProposalId) -> GatewayResult<VoteTotals> {
        let raw = self.raw_call(ContractCall::ProposalVoteTotals { proposal_id }).await?;
        decode_vote_totals(&raw)
    }

    pub async fn vote_receipt(&self, proposal_id: ProposalId, voter: Address) -> GatewayResult<VoteReceipt> {
        let raw = self.raw_call(ContractCall::VoteReceipt { proposal_id, voter }).await?;
        decode_receipt(&raw)
    }

    /// Governor parameters. Deployments that keep the delay only on the
    /// timelock get it filled in from there.
    pub async fn governance_params(&self) -> GatewayResult<GovernanceParams> {
        let raw = self.raw_call(ContractCall::GovernanceParams).await?;
        let (mut params, has_delay) = decode_params(&raw)?;
        if !has_delay {
            match self.raw_call(ContractCall::TimelockDelay).await {
                Ok(delay) => params.timelock_delay = decode_u64("getMinDelay", &delay)?,
                Err(e) => warn!("Timelock delay unavailable, reporting 0: {}", e),
            }
        }
        Ok(params)
    }

    pub async fn vote_cast_events(&self, filter: &LogFilter) -> GatewayResult<Vec<VoteRecord>> {
        self.raw_logs(filter).await?.iter().map(decode_vote_log).collect()
    }

    pub async fn transfer_events(&self, filter: &LogFilter) -> GatewayResult<Vec<TransferRecord>> {
        self.raw_logs(filter).await?.iter().map(decode_transfer_log).collect()
    }

    /// Writes are not bounded by the call timeout; the wallet may wait on the user.
    pub async fn send(&self, from: Address, write: &ContractWrite) -> GatewayResult<TxHash> {
        debug!("Submitting {} from {}", write.method(), from.short());
        self.gateway.send(from, write).await
    }
}

fn decode_error(method: &'static str, reason: impl Into<String>) -> GatewayError {
    GatewayError::Decode { method, reason: reason.into() }
}

/// Positional element of a tuple response or named member of an object response.
fn field<'v>(value: &'v Value, index: usize, names: &[&str]) -> Option<&'v Value> {
    match value {
        Value::Array(items) => items.get(index),
        Value::Object(map) => names.iter().find_map(|name| map.get(*name)),
        _ => None,
    }
}

fn require_field<'v>(method: &'static str, value: &'v Value, index: usize, names: &[&str]) -> GatewayResult<&'v Value> {
    field(value, index, names).ok_or_else(|| decode_error(method, format!("missing field {}", names[0])))
}

pub(crate) fn decode_uint(method: &'static str, value: &Value) -> GatewayResult<U256> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| decode_error(method, format!("not an unsigned integer: {}", number))),
        Value::String(text) => {
            let text = text.trim();
            if let Some(hex_digits) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                U256::from_str_radix(hex_digits, 16)
                    .map_err(|_| decode_error(method, format!("bad hex integer {:?}", text)))
            } else {
                U256::from_dec_str(text).map_err(|_| decode_error(method, format!("bad decimal integer {:?}", text)))
            }
        }
        Value::Object(map) => match map.get("hex").or_else(|| map.get("_hex")) {
            Some(inner) => decode_uint(method, inner),
            None => Err(decode_error(method, "object is not a big number")),
        },
        other => Err(decode_error(method, format!("expected integer, got {}", other))),
    }
}

pub(crate) fn decode_amount(method: &'static str, value: &Value) -> GatewayResult<TokenAmount> {
    decode_uint(method, value).map(TokenAmount::from_raw)
}

pub(crate) fn decode_u64(method: &'static str, value: &Value) -> GatewayResult<u64> {
    let raw = decode_uint(method, value)?;
    if raw > U256::from(u64::MAX) {
        return Err(decode_error(method, format!("{} does not fit in u64", raw)));
    }
    Ok(raw.low_u64())
}

fn decode_u8(method: &'static str, value: &Value) -> GatewayResult<u8> {
    let raw = decode_u64(method, value)?;
    u8::try_from(raw).map_err(|_| decode_error(method, format!("{} does not fit in u8", raw)))
}

fn decode_bool(method: &'static str, value: &Value) -> GatewayResult<bool> {
    match value {
        Value::Bool(flag) => Ok(*flag),
        Value::String(text) if text == "true" => Ok(true),
        Value::String(text) if text == "false" => Ok(false),
        other => Ok(!decode_uint(method, other)?.is_zero()),
    }
}

pub(crate) fn decode_address(method: &'static str, value: &Value) -> GatewayResult<Address> {
    let text = value
        .as_str()
        .ok_or_else(|| decode_error(method, format!("expected address string, got {}", value)))?;
    Address::parse(text).map_err(|e| decode_error(method, e.to_string()))
}

pub(crate) fn decode_address_list(method: &'static str, value: &Value) -> GatewayResult<Vec<Address>> {
    match value {
        Value::Array(items) => items.iter().map(|item| decode_address(method, item)).collect(),
        Value::Null => Ok(Vec::new()),
        other => Err(decode_error(method, format!("expected address list, got {}", other))),
    }
}

fn decode_support(method: &'static str, value: &Value) -> GatewayResult<VoteSupport> {
    VoteSupport::try_from(decode_u8(method, value)?).map_err(|reason| decode_error(method, reason))
}

pub(crate) fn decode_vote_totals(value: &Value) -> GatewayResult<VoteTotals> {
    const METHOD: &str = "getProposalVoteTotals";
    Ok(VoteTotals {
        for_votes: decode_amount(METHOD, require_field(METHOD, value, 0, &["forVotes", "for"])?)?,
        against_votes: decode_amount(METHOD, require_field(METHOD, value, 1, &["againstVotes", "against"])?)?,
        abstain_votes: decode_amount(METHOD, require_field(METHOD, value, 2, &["abstainVotes", "abstain"])?)?,
        total_voters: decode_u64(METHOD, require_field(METHOD, value, 3, &["totalVoters", "voterCount"])?)?,
        source: TallySource::Aggregate,
    })
}

pub(crate) fn decode_receipt(value: &Value) -> GatewayResult<VoteReceipt> {
    const METHOD: &str = "getReceipt";
    let has_voted = decode_bool(METHOD, require_field(METHOD, value, 0, &["hasVoted"])?)?;
    let support = if has_voted {
        Some(decode_support(METHOD, require_field(METHOD, value, 1, &["support"])?)?)
    } else {
        None
    };
    let weight = match field(value, 2, &["votes", "weight"]) {
        Some(raw) => decode_amount(METHOD, raw)?,
        None => TokenAmount::zero(),
    };
    Ok(VoteReceipt { has_voted, support, weight })
}

/// Returns the params plus whether the timelock delay was part of the response.
pub(crate) fn decode_params(value: &Value) -> GatewayResult<(GovernanceParams, bool)> {
    const METHOD: &str = "getGovernanceParams";
    let timelock = field(value, 4, &["timelockDelay", "minDelay"]);
    let params = GovernanceParams {
        quorum: decode_amount(METHOD, require_field(METHOD, value, 0, &["quorum", "quorumVotes"])?)?,
        proposal_threshold: decode_amount(METHOD, require_field(METHOD, value, 1, &["proposalThreshold"])?)?,
        voting_delay: decode_u64(METHOD, require_field(METHOD, value, 2, &["votingDelay"])?)?,
        voting_period: decode_u64(METHOD, require_field(METHOD, value, 3, &["votingPeriod"])?)?,
        timelock_delay: match timelock {
            Some(raw) => decode_u64(METHOD, raw)?,
            None => 0,
        },
    };
    Ok((params, timelock.is_some()))
}

pub(crate) fn decode_vote_log(log: &RawLog) -> GatewayResult<VoteRecord> {
    const EVENT: &str = "VoteCast";
    let fields = &log.fields;
    Ok(VoteRecord {
        voter: decode_address(EVENT, require_field(EVENT, fields, 0, &["voter"])?)?,
        proposal_id: decode_u64(EVENT, require_field(EVENT, fields, 1, &["proposalId"])?)?,
        support: decode_support(EVENT, require_field(EVENT, fields, 2, &["support"])?)?,
        weight: decode_amount(EVENT, require_field(EVENT, fields, 3, &["weight", "votes"])?)?,
        block_number: log.block_number,
        log_index: log.log_index,
    })
}

pub(crate) fn decode_transfer_log(log: &RawLog) -> GatewayResult<TransferRecord> {
    const EVENT: &str = "Transfer";
    let fields = &log.fields;
    Ok(TransferRecord {
        from: decode_address(EVENT, require_field(EVENT, fields, 0, &["from"])?)?,
        to: decode_address(EVENT, require_field(EVENT, fields, 1, &["to"])?)?,
        amount: decode_amount(EVENT, require_field(EVENT, fields, 2, &["value", "amount"])?)?,
        block_number: log.block_number,
        log_index: log.log_index,
    })
}
