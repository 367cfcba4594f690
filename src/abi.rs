//! Contract bindings generated with Alloy's `sol!` macro.
//!
//! Events are grouped by the contract that emits them. Forks that share a
//! signature share the binding: PancakeSwap V2 emits the Uniswap V2 events,
//! PancakeSwap V3 the Uniswap V3 ones except for its longer `Swap`, and
//! Aerodrome pools emit the Uniswap V2 `Mint`.
//!
//! ```
//! use dex_block_indexer::abi::IUniswapV2Pair;
//! use alloy::sol_types::SolEvent;
//!
//! assert_eq!(IUniswapV2Pair::Sync::SIGNATURE, "Sync(uint112,uint112)");
//! ```

use alloy::sol;

sol! {
    /// Uniswap V2 factory (also PancakeSwap V2).
    interface IUniswapV2Factory {
        event PairCreated(address indexed token0, address indexed token1, address pair, uint256 pairIndex);

        function getPair(address tokenA, address tokenB) external view returns (address pair);
    }

    /// Uniswap V2 pair (also PancakeSwap V2).
    interface IUniswapV2Pair {
        event Mint(address indexed sender, uint256 amount0, uint256 amount1);
        event Burn(address indexed sender, uint256 amount0, uint256 amount1, address indexed to);
        event Swap(
            address indexed sender,
            uint256 amount0In,
            uint256 amount1In,
            uint256 amount0Out,
            uint256 amount1Out,
            address indexed to
        );
        event Sync(uint112 reserve0, uint112 reserve1);

        function token0() external view returns (address);
        function token1() external view returns (address);
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
    }

    /// Uniswap V3 factory (also PancakeSwap V3).
    interface IUniswapV3Factory {
        event PoolCreated(
            address indexed token0,
            address indexed token1,
            uint24 indexed fee,
            int24 tickSpacing,
            address pool
        );

        function getPool(address tokenA, address tokenB, uint24 fee) external view returns (address pool);
    }

    /// Uniswap V3 pool.
    interface IUniswapV3Pool {
        event Mint(
            address sender,
            address indexed owner,
            int24 indexed tickLower,
            int24 indexed tickUpper,
            uint128 amount,
            uint256 amount0,
            uint256 amount1
        );
        event Burn(
            address indexed owner,
            int24 indexed tickLower,
            int24 indexed tickUpper,
            uint128 amount,
            uint256 amount0,
            uint256 amount1
        );
        event Swap(
            address indexed sender,
            address indexed recipient,
            int256 amount0,
            int256 amount1,
            uint160 sqrtPriceX96,
            uint128 liquidity,
            int24 tick
        );

        function fee() external view returns (uint24);
    }

    /// PancakeSwap V3 pool; only `Swap` differs from Uniswap V3.
    interface IPancakeV3Pool {
        event Swap(
            address indexed sender,
            address indexed recipient,
            int256 amount0,
            int256 amount1,
            uint160 sqrtPriceX96,
            uint128 liquidity,
            int24 tick,
            uint128 protocolFeesToken0,
            uint128 protocolFeesToken1
        );
    }

    /// Aerodrome pool factory.
    interface IAerodromeFactory {
        event PoolCreated(address indexed token0, address indexed token1, bool indexed stable, address pool, uint256 poolIndex);

        function isPool(address pool) external view returns (bool);
    }

    /// Aerodrome pool.
    interface IAerodromePool {
        event Swap(
            address indexed sender,
            address indexed to,
            uint256 amount0In,
            uint256 amount1In,
            uint256 amount0Out,
            uint256 amount1Out
        );
        event Sync(uint256 reserve0, uint256 reserve1);
        event Burn(address indexed sender, address indexed to, uint256 amount0, uint256 amount1);
    }

    /// ERC-20 metadata.
    interface IERC20 {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::b256;
    use alloy::sol_types::SolEvent;

    #[test]
    fn test_well_known_topics() {
        assert_eq!(
            IUniswapV2Pair::Sync::SIGNATURE_HASH,
            b256!("1c411e9a96e071241c2f21f7726b17ae89e3cab4c78be50e062b03a9fffbbad1")
        );
        assert_eq!(
            IUniswapV2Pair::Swap::SIGNATURE_HASH,
            b256!("d78ad95fa46c994b6551d0da85fc275fe613ce37657fb8d5e3d130840159d822")
        );
        assert_eq!(
            IUniswapV3Pool::Swap::SIGNATURE_HASH,
            b256!("c42079f94a6350d7e6235f29174924f928cc2ac818eb64fed8004e115fbcca67")
        );
        assert_eq!(
            IUniswapV2Factory::PairCreated::SIGNATURE_HASH,
            b256!("0d3648bd0f6ba80134a33ba9275ac585d9d315f0ad8355cddefde31afa28d0e9")
        );
    }

    #[test]
    fn test_fork_signatures_differ_where_expected() {
        assert_ne!(
            IUniswapV3Pool::Swap::SIGNATURE_HASH,
            IPancakeV3Pool::Swap::SIGNATURE_HASH
        );
        assert_ne!(
            IUniswapV2Pair::Sync::SIGNATURE_HASH,
            IAerodromePool::Sync::SIGNATURE_HASH
        );
        assert_ne!(
            IUniswapV2Pair::Burn::SIGNATURE_HASH,
            IAerodromePool::Burn::SIGNATURE_HASH
        );
    }
}
