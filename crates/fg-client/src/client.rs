// SPDX-License-Identifier: MIT OR Apache-2.0
//! [`FactGraphClient`]: the facade wiring the model, store, policy engines,
//! subscription manager, and transport into one authoring/query/subscribe
//! API.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use fg_authz::AuthorizationEngine;
use fg_crypto::Signer;
use fg_distribution::DistributionEngine;
use fg_model::{Envelope, Fact, FieldValue, PredecessorValue, Reference};
use fg_spec::{Projected, Specification};
use fg_store::{FactStore, MemoryStore};
use fg_subscription::{Network, Subscription, SubscriptionManager};
use fg_transport::{Negotiator, SendPriority, TransportConfig, WsTransport};
use tokio::sync::{mpsc, watch, Mutex};
use url::Url;

use crate::error::ClientError;

/// Everything [`FactGraphClient::connect`] needs beyond the signing
/// identity: where the server lives and how the transport should behave.
pub struct ClientConfig {
    /// The server's `http(s)://` base URL (negotiation, `/load`, and the
    /// WebSocket endpoint are all resolved relative to it).
    pub base_url: Url,
    /// Bearer token attached to negotiation and the socket URL, if the
    /// deployment requires one.
    pub bearer_token: Option<String>,
    /// Transport tuning; [`TransportConfig::default`] matches the numeric
    /// defaults this system mandates.
    pub transport: TransportConfig,
    /// Negotiator to use for the initial handshake.
    pub negotiator: Arc<dyn Negotiator>,
}

/// The client's identity, policy engines, store, transport, and
/// subscription manager, wired together. Cheap to clone — clones share the
/// same store, transport, and subscriber pool.
#[derive(Clone)]
pub struct FactGraphClient {
    store: Arc<dyn FactStore>,
    transport: Arc<WsTransport>,
    subscriptions: Arc<SubscriptionManager>,
    signer: Arc<Signer>,
    authz: Arc<AuthorizationEngine>,
    distribution: Arc<DistributionEngine>,
    encoder: Arc<Mutex<fg_codec::GraphEncoder>>,
}

impl FactGraphClient {
    /// Wire a client against an in-memory store and a fresh
    /// [`WsTransport`] connection. `authz`/`distribution` start with no
    /// rules registered — register them with
    /// [`Self::authorization_engine_mut`]-style access before first use, or
    /// construct with [`Self::with_engines`].
    #[must_use]
    pub fn connect(signer: Signer, config: ClientConfig) -> Self {
        Self::with_engines(
            signer,
            config,
            AuthorizationEngine::new(),
            DistributionEngine::new(false),
        )
    }

    /// Like [`Self::connect`], but with pre-populated authorization and
    /// distribution engines.
    #[must_use]
    pub fn with_engines(
        signer: Signer,
        config: ClientConfig,
        authz: AuthorizationEngine,
        distribution: DistributionEngine,
    ) -> Self {
        let store: Arc<dyn FactStore> = Arc::new(MemoryStore::new());
        let transport = Arc::new(WsTransport::connect(
            config.transport,
            config.base_url,
            config.bearer_token,
            config.negotiator,
        ));
        let network: Arc<dyn Network> = transport.clone();
        let subscriptions = Arc::new(SubscriptionManager::new(store.clone(), network));

        Self {
            store,
            transport,
            subscriptions,
            signer: Arc::new(signer),
            authz: Arc::new(authz),
            distribution: Arc::new(distribution),
            encoder: Arc::new(Mutex::new(fg_codec::GraphEncoder::new())),
        }
    }

    /// The client's own signing identity's PEM-encoded public key.
    #[must_use]
    pub fn public_key_pem(&self) -> &str {
        self.signer.public_key_pem()
    }

    /// The current transport connection state.
    #[must_use]
    pub fn transport_state(&self) -> fg_transport::ConnectionState {
        self.transport.state()
    }

    /// Author a new fact: build it, check the registered authorization
    /// rule for `fact_type` against this client's own key, sign it, persist
    /// it locally, and enqueue its wire encoding for upload. Returns the
    /// signed envelope once it is durable in the local store — delivery to
    /// the server is best-effort and asynchronous from here on.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Fact`] if `fact_type` is empty,
    /// [`ClientError::NotAuthorized`] if this client's key is not in the
    /// authorized population for `fact_type`, or [`ClientError::Crypto`] /
    /// [`ClientError::Store`] if signing or persisting fails.
    pub async fn fact(
        &self,
        fact_type: impl Into<String>,
        fields: BTreeMap<String, FieldValue>,
        predecessors: BTreeMap<String, PredecessorValue>,
    ) -> Result<Envelope, ClientError> {
        let fact_type = fact_type.into();
        let fact = Fact::new(fact_type.clone(), fields, predecessors)?;
        let candidate = fact.reference();

        let population = self
            .authz
            .authorized_population(&fact_type, &candidate, self.store.as_ref())
            .await?;
        if !population.permits(self.signer.public_key_pem()) {
            return Err(ClientError::NotAuthorized);
        }

        let signature = self.signer.sign(&fact)?;
        let envelope = Envelope::new(fact, [signature]);

        let saved = self.store.save(std::slice::from_ref(&envelope)).await?;
        let envelope = saved.into_iter().next().unwrap_or(envelope);

        self.enqueue_upload(&envelope).await;
        tracing::debug!(target: "factgraph.client", fact_type = %fact_type, hash = %candidate.hash, "authored fact");
        Ok(envelope)
    }

    async fn enqueue_upload(&self, envelope: &Envelope) {
        let mut encoder = self.encoder.lock().await;
        match encoder.encode(std::slice::from_ref(envelope)) {
            Ok(text) => self.transport.send(SendPriority::Normal, text),
            Err(err) => {
                tracing::warn!(target: "factgraph.client", %err, "failed to encode fact for upload");
            }
        }
    }

    /// Run `spec` against the local store with `given` bound to concrete
    /// references. Does not fetch anything from the network — pair with
    /// [`Self::subscribe`] to ensure the relevant facts are present first.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Eval`] if evaluation fails (undefined label,
    /// type mismatch, or a predecessor walk crosses an unknown reference).
    pub async fn query(
        &self,
        given: &BTreeMap<String, Reference>,
        spec: &Specification,
    ) -> Result<Vec<Projected>, ClientError> {
        Ok(fg_spec::evaluate(given, spec, self.store.as_ref()).await?)
    }

    /// Evaluate `trigger_spec` (bound to `given`) and garbage-collect every
    /// successor of a fact it doesn't keep: the surviving (triggering)
    /// facts and their ancestors are preserved, everything else reachable
    /// only as a successor is removed. Returns the number of facts removed.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Eval`] if evaluating `trigger_spec` fails, or
    /// wraps a store failure while computing the ancestor closure.
    pub async fn purge(
        &self,
        given: &BTreeMap<String, Reference>,
        trigger_spec: &Specification,
    ) -> Result<usize, ClientError> {
        Ok(fg_spec::purge(given, trigger_spec, self.store.as_ref()).await?)
    }

    /// Decide whether `user` may receive `spec`'s results, given `given`'s
    /// concrete bindings.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Distribution`] if no registered share rule
    /// admits `user` to some feed of `spec`.
    pub async fn check_distribution(
        &self,
        spec: &Specification,
        given: &BTreeMap<String, Reference>,
        user: &Reference,
    ) -> Result<(), ClientError> {
        self.distribution.check(spec, given, user, self.store.as_ref()).await?;
        Ok(())
    }

    /// Decompose `spec` (bound to `given`) into feeds, start (or join) a
    /// subscriber per feed, and return a [`Watch`]: a generation counter
    /// that bumps whenever a saved fact could have changed `spec`'s result
    /// (per [`fg_inverse::derive_inverses`]), plus the actual Added/Removed
    /// deltas against the previously emitted result set, maintained by
    /// re-running [`Self::query`] on every relevant notification so a
    /// caller never has to diff result sets itself.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Subscription`] if any decomposed feed fails
    /// to start.
    pub async fn subscribe(
        &self,
        given: &BTreeMap<String, Reference>,
        spec: &Specification,
    ) -> Result<Watch, ClientError> {
        let subscriptions = self.subscriptions.subscribe(spec).await?;
        let inverses = fg_inverse::derive_inverses(spec);
        let relevant_types: BTreeSet<String> =
            inverses.into_iter().map(|inverse| inverse.fact_type).collect();

        let (generation_tx, generation_rx) = watch::channel(0u64);
        let (delta_tx, delta_rx) = mpsc::unbounded_channel();

        // Seed the emitted set with whatever already evaluates locally, so
        // the first relevant notification reports a delta against reality
        // rather than replaying every pre-existing result as "added".
        let seed = fg_spec::evaluate(given, spec, self.store.as_ref())
            .await
            .unwrap_or_default();
        let previous: Arc<Mutex<HashSet<Projected>>> =
            Arc::new(Mutex::new(seed.into_iter().collect()));

        for subscription in &subscriptions {
            let Some(mut observed) = self.subscriptions.observe(&subscription.feed).await else {
                continue;
            };
            let relevant_types = relevant_types.clone();
            let generation_tx = generation_tx.clone();
            let delta_tx = delta_tx.clone();
            let previous = previous.clone();
            let store = self.store.clone();
            let given = given.clone();
            let spec = spec.clone();
            tokio::spawn(async move {
                while let Ok(batch) = observed.recv().await {
                    let touches_result = batch
                        .iter()
                        .any(|envelope| relevant_types.contains(envelope.fact.fact_type()));
                    if !touches_result {
                        continue;
                    }
                    generation_tx.send_modify(|generation| *generation += 1);

                    let Ok(current) = fg_spec::evaluate(&given, &spec, store.as_ref()).await
                    else {
                        continue;
                    };
                    let mut previous = previous.lock().await;
                    let deltas = diff_results(&previous, current.into_iter().collect());
                    for delta in deltas.0 {
                        let _ = delta_tx.send(delta);
                    }
                    *previous = deltas.1;
                }
            });
        }

        Ok(Watch {
            subscriptions,
            generation: generation_rx,
            deltas: delta_rx,
        })
    }

    /// Release every feed a [`Watch`] holds a reference to.
    pub async fn unsubscribe(&self, watch: &Watch) {
        for subscription in &watch.subscriptions {
            self.subscriptions.unsubscribe(subscription).await;
        }
    }

    /// Re-verify every signature on the envelopes backing `refs`, loading
    /// their full predecessor closure from the local store. Facts arriving
    /// over the network are already trusted enough to store (the server is
    /// the authenticated channel); call this before trusting a result in a
    /// context where a forged signature would matter, since neither the
    /// subscriber nor the store verify signatures themselves.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Store`] if any reference is unknown, or
    /// [`ClientError::Crypto`] on the first envelope that fails
    /// verification.
    pub async fn verify_stored(&self, refs: &[Reference]) -> Result<(), ClientError> {
        let envelopes = self.store.load(refs).await?;
        for envelope in &envelopes {
            fg_crypto::Verifier::verify_envelope(envelope)?;
        }
        Ok(())
    }
}

/// Diff a freshly evaluated result set against the previously emitted one,
/// returning the Added/Removed deltas (in no particular order) and the new
/// set to remember for next time.
fn diff_results(
    previous: &HashSet<Projected>,
    current: HashSet<Projected>,
) -> (Vec<Delta>, HashSet<Projected>) {
    let mut deltas: Vec<Delta> = current
        .difference(previous)
        .cloned()
        .map(Delta::Added)
        .collect();
    deltas.extend(previous.difference(&current).cloned().map(Delta::Removed));
    (deltas, current)
}

/// A change to a watched specification's emitted result set, maintained by
/// [`Watch`] across the local set of identities it has previously reported
/// (per spec.md's "observers maintain a local set of emitted result
/// identities to support removal deltas").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    /// `projected` was not present in the previous evaluation and is now.
    Added(Projected),
    /// `projected` was present in the previous evaluation and no longer is
    /// — typically because a `notExists` condition it depended on tripped.
    Removed(Projected),
}

/// A handle to an active subscription: the decomposed feeds it covers, a
/// generation counter that increments whenever a saved fact could have
/// changed the watched specification's result, and the actual Added/Removed
/// deltas against the previously emitted result set.
pub struct Watch {
    subscriptions: Vec<Subscription>,
    generation: watch::Receiver<u64>,
    deltas: mpsc::UnboundedReceiver<Delta>,
}

impl Watch {
    /// Wait for the next generation bump (a saved fact that could affect
    /// this watch's result), then return the new generation number. If
    /// every backing feed task has already exited, this never resolves —
    /// callers racing it against a cancellation signal of their own is the
    /// expected pattern, matching how [`fg_subscription::Subscriber`]
    /// itself never gives up on its own.
    pub async fn changed(&mut self) -> u64 {
        let _ = self.generation.changed().await;
        *self.generation.borrow()
    }

    /// Wait for the next Added/Removed delta computed against this watch's
    /// previously emitted result set. Returns `None` once every backing
    /// feed task has exited and the delta channel has drained.
    pub async fn next_delta(&mut self) -> Option<Delta> {
        self.deltas.recv().await
    }

    /// The feed strings this watch covers.
    #[must_use]
    pub fn feeds(&self) -> impl Iterator<Item = &str> {
        self.subscriptions.iter().map(|s| s.feed.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fg_crypto::Signer;
    use fg_transport::NoNegotiation;
    use rand::rngs::OsRng;
    use rsa::RsaPrivateKey;

    fn test_signer() -> Signer {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        Signer::from_private_key(private_key).unwrap()
    }

    fn test_client() -> FactGraphClient {
        let config = ClientConfig {
            base_url: Url::parse("http://127.0.0.1:0").unwrap(),
            bearer_token: None,
            transport: TransportConfig::default(),
            negotiator: Arc::new(NoNegotiation),
        };
        FactGraphClient::connect(test_signer(), config)
    }

    #[tokio::test]
    async fn authoring_with_no_registered_rule_is_not_authorized() {
        let client = test_client();
        let err = client
            .fact("Post", BTreeMap::new(), BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotAuthorized));
    }

    #[tokio::test]
    async fn authoring_with_everyone_rule_saves_and_signs() {
        let mut authz = AuthorizationEngine::new();
        authz.add_rule(fg_authz::AuthorizationRule::any("Post")).unwrap();
        let config = ClientConfig {
            base_url: Url::parse("http://127.0.0.1:0").unwrap(),
            bearer_token: None,
            transport: TransportConfig::default(),
            negotiator: Arc::new(NoNegotiation),
        };
        let signer = test_signer();
        let public_key = signer.public_key_pem().to_string();
        let client = FactGraphClient::with_engines(signer, config, authz, DistributionEngine::new(false));

        let envelope = client.fact("Post", BTreeMap::new(), BTreeMap::new()).await.unwrap();
        assert_eq!(envelope.fact.fact_type(), "Post");
        assert_eq!(envelope.signatures.get(&public_key).unwrap().public_key, public_key);
        assert_eq!(client.public_key_pem(), public_key);
    }

    #[test]
    fn every_client_error_variant_converts_to_a_catalog_error() {
        let variants = vec![
            ClientError::Fact(fg_model::FactError::EmptyType),
            ClientError::NotAuthorized,
        ];
        for variant in variants {
            let catalog: fg_error::CatalogError = variant.into();
            assert!(!catalog.code.code().is_empty());
        }
    }

    #[test]
    fn diffing_a_new_result_against_an_empty_previous_set_is_one_addition() {
        let post = Projected::Fact(Reference::new("Post", "abc"));
        let (deltas, next) = diff_results(&HashSet::new(), [post.clone()].into_iter().collect());
        assert_eq!(deltas, vec![Delta::Added(post.clone())]);
        assert!(next.contains(&post));
    }

    #[test]
    fn diffing_an_empty_result_against_a_prior_one_is_one_removal() {
        let post = Projected::Fact(Reference::new("Post", "abc"));
        let previous: HashSet<Projected> = [post.clone()].into_iter().collect();
        let (deltas, next) = diff_results(&previous, HashSet::new());
        assert_eq!(deltas, vec![Delta::Removed(post)]);
        assert!(next.is_empty());
    }

    #[test]
    fn diffing_an_unchanged_result_set_reports_no_deltas() {
        let post = Projected::Fact(Reference::new("Post", "abc"));
        let previous: HashSet<Projected> = [post.clone()].into_iter().collect();
        let (deltas, next) = diff_results(&previous, [post].into_iter().collect());
        assert!(deltas.is_empty());
        assert_eq!(next, previous);
    }
}
