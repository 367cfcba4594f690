//! Static protocol tables: which factories exist and which protocols can emit
//! a given topic.
//!
//! The registry is built once at startup and shared read-only behind an
//! `Arc`. Tests construct their own with [`ProtocolRegistry::with_factories`].

use crate::abi::{
    IAerodromeFactory, IAerodromePool, IPancakeV3Pool, IUniswapV2Factory, IUniswapV2Pair,
    IUniswapV3Factory, IUniswapV3Pool,
};
use crate::types::ProtocolId;
use alloy::primitives::{address, Address, B256};
use alloy::sol_types::SolEvent;
use std::collections::{BTreeMap, HashMap};

/// Factory deployments on Base.
pub const BASE_FACTORIES: [(ProtocolId, Address); 5] = [
    (
        ProtocolId::UniswapV2,
        address!("8909Dc15e40173Ff4699343b6eB8132c65e18eC6"),
    ),
    (
        ProtocolId::UniswapV3,
        address!("33128a8fC17869897dcE68Ed026d694621f6FDfD"),
    ),
    (
        ProtocolId::PancakeV2,
        address!("02a84c1b3BBD7401a5f7fa98a384EBC70bB5749E"),
    ),
    (
        ProtocolId::PancakeV3,
        address!("0BFbCF9fa4f9C56B0F40a671Ad40E0805A091865"),
    ),
    (
        ProtocolId::Aerodrome,
        address!("420DD381b31aEf6683db6B902084cB0FFECe40Da"),
    ),
];

const V2_FAMILY: &[ProtocolId] = &[ProtocolId::UniswapV2, ProtocolId::PancakeV2];
const V2_MINT_FAMILY: &[ProtocolId] = &[
    ProtocolId::UniswapV2,
    ProtocolId::PancakeV2,
    ProtocolId::Aerodrome,
];
const V3_FAMILY: &[ProtocolId] = &[ProtocolId::UniswapV3, ProtocolId::PancakeV3];

/// Every routed topic and the protocols whose contracts emit it.
fn topic_table() -> [(B256, &'static [ProtocolId]); 14] {
    [
        (IUniswapV2Factory::PairCreated::SIGNATURE_HASH, V2_FAMILY),
        (IUniswapV2Pair::Mint::SIGNATURE_HASH, V2_MINT_FAMILY),
        (IUniswapV2Pair::Burn::SIGNATURE_HASH, V2_FAMILY),
        (IUniswapV2Pair::Swap::SIGNATURE_HASH, V2_FAMILY),
        (IUniswapV2Pair::Sync::SIGNATURE_HASH, V2_FAMILY),
        (IUniswapV3Factory::PoolCreated::SIGNATURE_HASH, V3_FAMILY),
        (IUniswapV3Pool::Mint::SIGNATURE_HASH, V3_FAMILY),
        (IUniswapV3Pool::Burn::SIGNATURE_HASH, V3_FAMILY),
        (IUniswapV3Pool::Swap::SIGNATURE_HASH, &[ProtocolId::UniswapV3]),
        (IPancakeV3Pool::Swap::SIGNATURE_HASH, &[ProtocolId::PancakeV3]),
        (IAerodromeFactory::PoolCreated::SIGNATURE_HASH, &[ProtocolId::Aerodrome]),
        (IAerodromePool::Swap::SIGNATURE_HASH, &[ProtocolId::Aerodrome]),
        (IAerodromePool::Sync::SIGNATURE_HASH, &[ProtocolId::Aerodrome]),
        (IAerodromePool::Burn::SIGNATURE_HASH, &[ProtocolId::Aerodrome]),
    ]
}

/// Immutable protocol lookup tables.
#[derive(Debug, Clone)]
pub struct ProtocolRegistry {
    factories: BTreeMap<ProtocolId, Address>,
    factory_protocols: HashMap<Address, ProtocolId>,
    topic_protocols: HashMap<B256, Vec<ProtocolId>>,
    topic_factories: HashMap<B256, Vec<Address>>,
}

impl ProtocolRegistry {
    /// Registry with the Base mainnet deployments.
    #[must_use]
    pub fn base() -> Self {
        Self::with_factories(BASE_FACTORIES)
    }

    /// Registry with custom factory addresses. Protocols without a factory
    /// still route their events but can never be verified.
    #[must_use]
    pub fn with_factories(factories: impl IntoIterator<Item = (ProtocolId, Address)>) -> Self {
        let factories: BTreeMap<ProtocolId, Address> = factories.into_iter().collect();
        let factory_protocols = factories.iter().map(|(p, f)| (*f, *p)).collect();

        let mut topic_protocols = HashMap::new();
        let mut topic_factories = HashMap::new();
        for (topic, protocols) in topic_table() {
            topic_protocols.insert(topic, protocols.to_vec());
            topic_factories.insert(
                topic,
                protocols
                    .iter()
                    .filter_map(|p| factories.get(p).copied())
                    .collect::<Vec<_>>(),
            );
        }

        Self {
            factories,
            factory_protocols,
            topic_protocols,
            topic_factories,
        }
    }

    /// Factory of `protocol`.
    #[must_use]
    pub fn factory(&self, protocol: ProtocolId) -> Option<Address> {
        self.factories.get(&protocol).copied()
    }

    /// Protocol a factory belongs to.
    #[must_use]
    pub fn protocol_of_factory(&self, factory: Address) -> Option<ProtocolId> {
        self.factory_protocols.get(&factory).copied()
    }

    /// Protocols that may have emitted `topic`, in discovery order.
    #[must_use]
    pub fn candidates(&self, topic: &B256) -> &[ProtocolId] {
        self.topic_protocols.get(topic).map_or(&[], Vec::as_slice)
    }

    /// Factories allowed to emit the creation event `topic`.
    #[must_use]
    pub fn allowed_factories(&self, topic: &B256) -> &[Address] {
        self.topic_factories.get(topic).map_or(&[], Vec::as_slice)
    }

    /// Whether `factory` may emit `topic`.
    #[must_use]
    pub fn is_allowed_factory(&self, topic: &B256, factory: Address) -> bool {
        self.allowed_factories(topic).contains(&factory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_factories_map_both_ways() {
        let registry = ProtocolRegistry::base();
        for (protocol, factory) in BASE_FACTORIES {
            assert_eq!(registry.factory(protocol), Some(factory));
            assert_eq!(registry.protocol_of_factory(factory), Some(protocol));
        }
        assert_eq!(registry.protocol_of_factory(Address::ZERO), None);
    }

    #[test]
    fn test_shared_topics_list_every_emitter() {
        let registry = ProtocolRegistry::base();
        assert_eq!(
            registry.candidates(&IUniswapV2Pair::Mint::SIGNATURE_HASH),
            V2_MINT_FAMILY
        );
        assert_eq!(
            registry.candidates(&IUniswapV3Pool::Swap::SIGNATURE_HASH),
            &[ProtocolId::UniswapV3]
        );
        assert!(registry.candidates(&B256::ZERO).is_empty());
    }

    #[test]
    fn test_creation_topic_factories() {
        let registry = ProtocolRegistry::base();
        let topic = IUniswapV2Factory::PairCreated::SIGNATURE_HASH;
        assert!(registry.is_allowed_factory(&topic, BASE_FACTORIES[0].1));
        assert!(registry.is_allowed_factory(&topic, BASE_FACTORIES[2].1));
        assert!(!registry.is_allowed_factory(&topic, BASE_FACTORIES[1].1));
    }

    #[test]
    fn test_custom_registry_without_factory() {
        let registry = ProtocolRegistry::with_factories([(ProtocolId::UniswapV2, Address::ZERO)]);
        assert_eq!(registry.factory(ProtocolId::Aerodrome), None);
        assert!(registry
            .allowed_factories(&IAerodromeFactory::PoolCreated::SIGNATURE_HASH)
            .is_empty());
    }
}
