//! Withdrawal of consumer-channel funds via hermes pay-and-settle.
//!
//! The provider issues a promise to itself for the whole consumer channel
//! balance, hermes answers with a promise it signs, and that promise is
//! settled on-chain with a beneficiary authorization. Shares the settle
//! guard with regular settlement, so an identity never withdraws and
//! settles at the same time.

use paysettle_types::{
    Address, AgreementId, ChainId, ChannelId, ExchangeMessage, Identity, Invoice,
    PayAndSettleBeneficiaryPayload, PaysettleError, Promise, Result, constants, to_bytes32,
};
use rand::RngCore;
use rust_decimal::Decimal;

use crate::{
    collaborators::{AddressProvider, ChainClient, Keystore, PaySettler, PromiseStorage},
    settler::{HermesPromiseSettler, Submission},
    state::SettleGuard,
};

impl HermesPromiseSettler {
    /// Withdraw the consumer channel balance of `provider` to `beneficiary`.
    ///
    /// Only served on the configured L2 chain. Returns once the settlement
    /// is confirmed, timed out, or the settler shuts down. No settlement
    /// history is written for withdrawals.
    pub async fn withdraw(
        &self,
        chain_id: ChainId,
        provider: Identity,
        hermes_id: Address,
        beneficiary: Address,
    ) -> Result<()> {
        let guard = self.state.try_acquire(&provider)?;

        if chain_id != self.config.l2_chain_id {
            return Err(PaysettleError::WithdrawalChainMismatch {
                expected: self.config.l2_chain_id,
                actual: chain_id,
            });
        }

        let addresses = &self.collaborators.address_provider;
        let consumer_channel = addresses
            .channel_address(chain_id, &provider)
            .await
            .map_err(|e| PaysettleError::AddressResolution {
                what: "consumer channel address",
                reason: e.to_string(),
            })?;
        let active_hermes = addresses
            .active_hermes(chain_id)
            .await
            .map_err(|e| PaysettleError::AddressResolution {
                what: "active hermes",
                reason: e.to_string(),
            })?;

        let amount = self.withdrawal_amount(chain_id, &consumer_channel).await?;
        tracing::info!(%provider, %amount, channel = %consumer_channel, "Withdrawing consumer channel balance");

        let message = self.issue_self_promise(chain_id, amount, provider, &consumer_channel, &active_hermes)?;

        let session_id = uuid::Uuid::now_v7().to_string();
        self.collaborators
            .pay_settler
            .pay_and_settle(&message.promise.r, &message, &provider, &session_id)
            .await
            .map_err(|e| PaysettleError::PayAndSettle {
                reason: e.to_string(),
            })?;

        let channel_id = ChannelId::for_pay_and_settle(&provider, &active_hermes);
        let stored = self
            .collaborators
            .promise_storage
            .get(chain_id, &channel_id)
            .await
            .map_err(|e| PaysettleError::PromiseStorage(e.to_string()))?;
        let promise = stored.promise_with_secret()?;

        let mut payload = PayAndSettleBeneficiaryPayload::new(
            beneficiary,
            self.config.l1_chain_id,
            channel_id,
            promise.amount,
            to_bytes32(&message.promise.r),
        );
        payload.signature = self.sign(&provider, &payload.message_hash())?;

        let submission = Submission::PayAndSettle {
            beneficiary: payload.beneficiary,
            signature: hex::encode(&payload.signature),
        };
        self.pay_and_settle(guard, submission, hermes_id, promise, amount)
            .await
    }

    /// Fee update, fee check against the withdrawn amount, then submission.
    async fn pay_and_settle(
        &self,
        guard: SettleGuard,
        submission: Submission,
        hermes_id: Address,
        promise: Promise,
        withdrawal_amount: Decimal,
    ) -> Result<()> {
        let provider = *guard.identity();

        let updated = self
            .fee_updater
            .update_with_latest_fee(&hermes_id, &promise)
            .await
            .inspect_err(|e| tracing::error!(%provider, error = %e, "Could not update promise fee"))?;

        if updated.fee > withdrawal_amount {
            tracing::error!(
                %provider,
                promise_amount = %updated.amount,
                transactor_fee = %updated.fee,
                "Earned amount too small for withdrawal"
            );
            return Err(PaysettleError::WithdrawalBelowFees {
                needed: updated.fee,
                available: withdrawal_amount,
            });
        }

        self.submit_and_confirm(guard, submission, hermes_id, updated, None)
            .await
    }

    async fn withdrawal_amount(&self, chain_id: ChainId, consumer_channel: &Address) -> Result<Decimal> {
        let token = self
            .collaborators
            .address_provider
            .token_address(chain_id)
            .await
            .map_err(|e| PaysettleError::AddressResolution {
                what: "token address",
                reason: e.to_string(),
            })?;

        let balance = self
            .collaborators
            .chain
            .token_balance(chain_id, &token, consumer_channel)
            .await
            .map_err(|e| PaysettleError::Upstream(format!("could not get token balance: {e}")))?;

        if balance <= Decimal::ZERO {
            return Err(PaysettleError::NothingToWithdraw {
                channel: *consumer_channel,
                balance,
            });
        }
        Ok(balance)
    }

    /// Build and sign a zero-fee promise from the provider to itself, wrapped
    /// in an exchange message addressed to `hermes_id`.
    fn issue_self_promise(
        &self,
        chain_id: ChainId,
        amount: Decimal,
        provider: Identity,
        consumer_channel: &Address,
        hermes_id: &Address,
    ) -> Result<ExchangeMessage> {
        let r = self.generate_r();
        let agreement_id = self.generate_agreement_id();
        let invoice = Invoice::new(agreement_id, amount, Decimal::ZERO, &r, chain_id, provider);

        let mut promise = Promise {
            chain_id,
            channel_id: ChannelId::from_address(consumer_channel),
            amount,
            fee: invoice.transactor_fee,
            hashlock: invoice.hashlock,
            r: Vec::new(),
            signature: Vec::new(),
        };
        promise.signature = self.sign(&provider, &promise.message_hash())?;
        promise.r = r.to_vec();

        let mut message = ExchangeMessage {
            promise,
            agreement_id: invoice.agreement_id,
            agreement_total: invoice.agreement_total,
            provider,
            hermes_id: *hermes_id,
            chain_id,
            signature: Vec::new(),
        };
        message.signature = self.sign(&provider, &message.message_hash())?;
        Ok(message)
    }

    fn sign(&self, provider: &Identity, hash: &[u8; 32]) -> Result<Vec<u8>> {
        self.collaborators
            .keystore
            .sign_hash(provider, hash)
            .map_err(|e| PaysettleError::Signing {
                identity: *provider,
                reason: e.to_string(),
            })
    }

    pub(crate) fn generate_r(&self) -> [u8; constants::SECRET_LEN] {
        let mut r = [0u8; constants::SECRET_LEN];
        self.rng.lock().fill_bytes(&mut r);
        r
    }

    pub(crate) fn generate_agreement_id(&self) -> AgreementId {
        let mut id = [0u8; constants::SECRET_LEN];
        self.rng.lock().fill_bytes(&mut id);
        AgreementId(id)
    }
}
