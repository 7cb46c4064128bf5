//! Volume - Collective Volume Calculator
//!
//! Prints the byte volume the profiler charges for one collective call.
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use parabench::profile::{
    all_gather_volume, all_reduce_volume, broadcast_volume, reduce_scatter_volume, reduce_volume,
    CollectiveKind,
};

use crate::cli::{Primitive, VolumeArgs};
use crate::error::{CliError, CliResult};

/// Execute the `volume` command
pub fn execute(args: VolumeArgs) -> CliResult<()> {
    let (kind, volume) = compute(&args)?;
    println!(
        "{kind} over {} ranks: {volume:.0} bytes ({:.6} MB)",
        args.group_size,
        volume / (1024.0 * 1024.0)
    );
    Ok(())
}

/// Modelled `(primitive, bytes)` for the given arguments.
fn compute(args: &VolumeArgs) -> CliResult<(CollectiveKind, f64)> {
    if args.group_size == 0 {
        return Err(CliError::InvalidArgument("group size must be at least 1".to_string()));
    }
    let bytes = || {
        args.bytes
            .ok_or_else(|| CliError::InvalidArgument("--bytes is required".to_string()))
    };
    let chunks = || -> CliResult<Vec<usize>> {
        if args.chunks.is_empty() {
            Ok(vec![bytes()?; args.group_size])
        } else if args.chunks.len() == args.group_size {
            Ok(args.chunks.clone())
        } else {
            Err(CliError::InvalidArgument(format!(
                "expected {} chunk sizes, got {}",
                args.group_size,
                args.chunks.len()
            )))
        }
    };

    Ok(match args.primitive {
        Primitive::AllReduce => (
            CollectiveKind::AllReduce,
            all_reduce_volume(args.group_size, bytes()?),
        ),
        Primitive::AllGather => (
            CollectiveKind::AllGather,
            all_gather_volume(args.group_size, &chunks()?),
        ),
        Primitive::ReduceScatter => (
            CollectiveKind::ReduceScatter,
            reduce_scatter_volume(args.group_size, &chunks()?),
        ),
        Primitive::Broadcast => (CollectiveKind::Broadcast, broadcast_volume(bytes()?)),
        Primitive::Reduce => (CollectiveKind::Reduce, reduce_volume(bytes()?)),
    })
}
