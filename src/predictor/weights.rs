//! Binary weight-file codec.
//!
//! Layout (all integers `u64`, all floats `f64`, little-endian):
//! ```text
//! n_hidden
//! neurons_per_layer[n_hidden]
//! for each hidden layer:
//!     n_neurons, input_len
//!     for each neuron: in_len, weights[in_len], bias
//! [output layer in the same per-layer encoding]
//! ```
//! No per-neuron activation tag is written — the architecture is all-linear.
//!
//! Loading is prefix-tolerant: a file layer is adopted only if both its
//! neuron count and its input length match the configured layer at that
//! index; the first disagreement (or running out of file layers) leaves
//! the remaining configured layers at their random initialization. The
//! output layer is attempted independently of how many hidden layers
//! loaded.

use std::io::{self, Read, Write};

use crate::error::WeightLoadError;
use crate::predictor::mlp::{Layer, Mlp, Neuron};

fn read_u64(r: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_f64(r: &mut impl Read) -> io::Result<f64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn write_u64(w: &mut impl Write, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_f64(w: &mut impl Write, v: f64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_layer(w: &mut impl Write, layer: &Layer) -> io::Result<()> {
    write_u64(w, layer.neurons.len() as u64)?;
    write_u64(w, layer.neurons.first().map(|n| n.weights.len()).unwrap_or(0) as u64)?;
    for neuron in &layer.neurons {
        write_u64(w, neuron.weights.len() as u64)?;
        for weight in &neuron.weights {
            write_f64(w, *weight)?;
        }
        write_f64(w, neuron.bias)?;
    }
    Ok(())
}

/// Serialize `mlp` in the canonical format. The caller is responsible for
/// the NaN/Inf pre-write guard (§4.4) and for atomic rename-on-write.
pub fn write_mlp(w: &mut impl Write, mlp: &Mlp) -> io::Result<()> {
    let n_hidden = mlp.layers.len() - 1;
    write_u64(w, n_hidden as u64)?;
    for layer in &mlp.layers[..n_hidden] {
        write_u64(w, layer.neurons.len() as u64)?;
    }
    for layer in &mlp.layers {
        write_layer(w, layer)?;
    }
    Ok(())
}

struct FileLayer {
    n_neurons: u64,
    input_len: u64,
    neurons: Vec<Neuron>,
}

fn read_layer(r: &mut impl Read) -> Result<FileLayer, WeightLoadError> {
    let n_neurons = read_u64(r).map_err(|_| WeightLoadError::Truncated("layer header"))?;
    let input_len = read_u64(r).map_err(|_| WeightLoadError::Truncated("layer header"))?;
    let mut neurons = Vec::with_capacity(n_neurons as usize);
    for _ in 0..n_neurons {
        let in_len = read_u64(r).map_err(|_| WeightLoadError::Truncated("neuron header"))?;
        let mut weights = Vec::with_capacity(in_len as usize);
        for _ in 0..in_len {
            weights.push(read_f64(r).map_err(|_| WeightLoadError::Truncated("neuron weight"))?);
        }
        let bias = read_f64(r).map_err(|_| WeightLoadError::Truncated("neuron bias"))?;
        neurons.push(Neuron { weights, bias });
    }
    Ok(FileLayer { n_neurons, input_len, neurons })
}

/// Load a weight file into `mlp` in place, prefix-tolerantly. Returns
/// `Ok(())` even when some or all layers were left at random init because
/// the file's shape diverged — the caller always proceeds with whatever
/// ended up in `mlp`. A hard `Err` is only returned when the file cannot
/// be read as a well-formed header/layer stream at all.
pub fn load_mlp(r: &mut impl Read, mlp: &mut Mlp) -> Result<(), WeightLoadError> {
    let file_n_hidden = read_u64(r).map_err(|_| WeightLoadError::Truncated("n_hidden"))?;
    let mut file_neurons_per_layer = Vec::with_capacity(file_n_hidden as usize);
    for _ in 0..file_n_hidden {
        file_neurons_per_layer.push(read_u64(r).map_err(|_| WeightLoadError::Truncated("neurons_per_layer"))?);
    }

    let configured_n_hidden = mlp.layers.len() - 1;
    let mut fan_in = crate::datapoint::INPUT_SIZE as u64;
    let mut still_matching = true;

    for i in 0..file_n_hidden as usize {
        let file_layer = read_layer(r)?;
        let is_configured_slot = i < configured_n_hidden;
        let configured_matches = still_matching
            && is_configured_slot
            && file_layer.n_neurons == mlp.layers[i].neurons.len() as u64
            && file_layer.input_len == fan_in;

        if configured_matches {
            mlp.layers[i].neurons = file_layer.neurons;
            fan_in = file_layer.n_neurons;
        } else {
            // A mismatch here means the rest of the file's hidden layers
            // are no longer trustworthy against the configured prefix.
            still_matching = false;
            if is_configured_slot {
                // Keep the configured (random-initialized) fan-in moving
                // forward so later layers still line up with the network
                // actually in memory.
                fan_in = mlp.layers[i].neurons.len() as u64;
            }
        }
    }

    // Output layer: attempted independently of hidden-layer load outcome.
    let output_idx = mlp.layers.len() - 1;
    let output_fan_in = if configured_n_hidden == 0 {
        crate::datapoint::INPUT_SIZE as u64
    } else {
        mlp.layers[configured_n_hidden - 1].neurons.len() as u64
    };
    let output_layer = read_layer(r)?;
    if output_layer.n_neurons == mlp.layers[output_idx].neurons.len() as u64
        && output_layer.input_len == output_fan_in
    {
        mlp.layers[output_idx].neurons = output_layer.neurons;
    } else {
        return Err(WeightLoadError::OutputShapeMismatch {
            file_neurons: output_layer.n_neurons,
            file_input_len: output_layer.input_len,
            expected_neurons: mlp.layers[output_idx].neurons.len(),
            expected_input_len: output_fan_in as usize,
        });
    }

    Ok(())
}
