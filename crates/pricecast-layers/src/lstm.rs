//! Long Short-Term Memory layer with backpropagation through time.
//!
//! Gate layout inside the fused `[.., 4 * hidden]` weight matrices is
//! `input | forget | cell | output`:
//!
//! ```text
//! z_t = x_t W + h_{t-1} U + b
//! i = sigmoid(z_i)   f = sigmoid(z_f)   g = tanh(z_g)   o = sigmoid(z_o)
//! c_t = f * c_{t-1} + i * g
//! h_t = o * tanh(c_t)
//! ```
//!
//! Inputs are `[batch, time, input_size]`. With `return_sequences` the layer
//! emits every hidden state (`[batch, time, hidden]`), otherwise only the last
//! one (`[batch, hidden]`).

use rand::rngs::StdRng;

use crate::activation::{sigmoid, tanh};
use crate::error::LayerError;
use crate::initializer::Initializer;
use crate::layer::Layer;
use crate::tensor::Tensor;

/// Intermediates recorded by a training forward pass.
#[derive(Debug, Clone)]
struct LstmCache {
    /// `x_t`, each `[batch, input_size]`.
    inputs: Vec<Tensor>,
    /// Activated gates per step, each `[batch, 4 * hidden]`.
    gates: Vec<Tensor>,
    /// `c_0 ..= c_T`, each `[batch, hidden]`.
    cells: Vec<Tensor>,
    /// `h_0 ..= h_T`, each `[batch, hidden]`.
    hiddens: Vec<Tensor>,
}

/// A single-direction LSTM layer.
#[derive(Debug, Clone)]
pub struct Lstm {
    input_size: usize,
    hidden_size: usize,
    return_sequences: bool,
    kernel: Tensor,
    recurrent_kernel: Tensor,
    bias: Tensor,
    kernel_grad: Tensor,
    recurrent_kernel_grad: Tensor,
    bias_grad: Tensor,
    cache: Option<LstmCache>,
}

impl Lstm {
    /// Creates an LSTM with Glorot-uniform input weights, orthogonal recurrent
    /// weights and a unit forget-gate bias.
    pub fn with_rng(
        input_size: usize,
        hidden_size: usize,
        return_sequences: bool,
        rng: &mut StdRng,
    ) -> Self {
        let h = hidden_size;
        let kernel = Initializer::GlorotUniform.initialize(&[input_size, 4 * h], rng);
        let recurrent_kernel = Initializer::Orthogonal.initialize(&[h, 4 * h], rng);
        let mut bias = Tensor::zeros(&[4 * h]);
        bias.data_mut()[h..2 * h].iter_mut().for_each(|b| *b = 1.0);
        Self {
            input_size,
            hidden_size,
            return_sequences,
            kernel_grad: Tensor::zeros(kernel.shape()),
            recurrent_kernel_grad: Tensor::zeros(recurrent_kernel.shape()),
            bias_grad: Tensor::zeros(bias.shape()),
            kernel,
            recurrent_kernel,
            bias,
            cache: None,
        }
    }

    /// Width of each input step.
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Number of hidden units.
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Whether every time step is emitted.
    pub fn return_sequences(&self) -> bool {
        self.return_sequences
    }

    fn check_input(&self, input: &Tensor) -> Result<(), LayerError> {
        if input.ndim() != 3 {
            return Err(LayerError::ForwardError {
                message: format!("LSTM expects [batch, time, features], got {:?}", input.shape()),
            });
        }
        if input.shape()[1] == 0 {
            return Err(LayerError::ForwardError {
                message: "LSTM input has no time steps".to_string(),
            });
        }
        if input.shape()[2] != self.input_size {
            return Err(LayerError::InvalidInputDimension {
                expected: self.input_size,
                actual: input.shape()[2],
            });
        }
        Ok(())
    }

    /// One recurrence step; returns `(activated_gates, c_t, h_t)`.
    fn step(&self, x: &Tensor, h_prev: &Tensor, c_prev: &Tensor) -> (Tensor, Tensor, Tensor) {
        let h = self.hidden_size;
        let batch = x.shape()[0];
        let mut z = x
            .matmul(&self.kernel)
            .add(&h_prev.matmul(&self.recurrent_kernel))
            .add(&self.bias);

        let mut c = vec![0.0; batch * h];
        let mut hidden = vec![0.0; batch * h];
        let zd = z.data_mut();
        for b in 0..batch {
            let row = &mut zd[b * 4 * h..(b + 1) * 4 * h];
            for j in 0..h {
                let i_g = sigmoid(row[j]);
                let f_g = sigmoid(row[h + j]);
                let g_g = tanh(row[2 * h + j]);
                let o_g = sigmoid(row[3 * h + j]);
                row[j] = i_g;
                row[h + j] = f_g;
                row[2 * h + j] = g_g;
                row[3 * h + j] = o_g;
                let c_t = f_g * c_prev.data()[b * h + j] + i_g * g_g;
                c[b * h + j] = c_t;
                hidden[b * h + j] = o_g * c_t.tanh();
            }
        }
        (
            z,
            Tensor::from_data(&[batch, h], c),
            Tensor::from_data(&[batch, h], hidden),
        )
    }

    fn run(&self, input: &Tensor) -> Result<(Tensor, LstmCache), LayerError> {
        self.check_input(input)?;
        let batch = input.shape()[0];
        let steps = input.shape()[1];
        let mut cache = LstmCache {
            inputs: Vec::with_capacity(steps),
            gates: Vec::with_capacity(steps),
            cells: vec![Tensor::zeros(&[batch, self.hidden_size])],
            hiddens: vec![Tensor::zeros(&[batch, self.hidden_size])],
        };
        for t in 0..steps {
            let x_t = input.time_step(t);
            let (gates, c_t, h_t) = self.step(&x_t, &cache.hiddens[t], &cache.cells[t]);
            cache.inputs.push(x_t);
            cache.gates.push(gates);
            cache.cells.push(c_t);
            cache.hiddens.push(h_t);
        }
        let output = if self.return_sequences {
            Tensor::stack_time(&cache.hiddens[1..])
        } else {
            cache.hiddens[steps].clone()
        };
        Ok((output, cache))
    }
}

impl Layer for Lstm {
    fn forward(&self, input: &Tensor) -> Result<Tensor, LayerError> {
        self.run(input).map(|(output, _)| output)
    }

    fn forward_train(&mut self, input: &Tensor) -> Result<Tensor, LayerError> {
        let (output, cache) = self.run(input)?;
        self.cache = Some(cache);
        Ok(output)
    }

    fn backward(&mut self, grad: &Tensor) -> Result<Tensor, LayerError> {
        let cache = self.cache.as_ref().ok_or(LayerError::NotInitialized)?;
        let h = self.hidden_size;
        let steps = cache.inputs.len();
        let batch = cache.hiddens[0].shape()[0];
        let expected = if self.return_sequences {
            vec![batch, steps, h]
        } else {
            vec![batch, h]
        };
        if grad.shape() != expected.as_slice() {
            return Err(LayerError::ShapeMismatch {
                expected,
                actual: grad.shape().to_vec(),
            });
        }

        let kernel_t = self.kernel.transpose();
        let recurrent_t = self.recurrent_kernel.transpose();
        let mut dh_next = Tensor::zeros(&[batch, h]);
        let mut dc_next = vec![0.0f32; batch * h];
        let mut dx_steps = vec![Tensor::zeros(&[batch, self.input_size]); steps];
        let mut kernel_grad = Tensor::zeros(self.kernel.shape());
        let mut recurrent_grad = Tensor::zeros(self.recurrent_kernel.shape());
        let mut bias_grad = Tensor::zeros(self.bias.shape());

        for t in (0..steps).rev() {
            let mut dh = dh_next.clone();
            if self.return_sequences {
                dh.add_assign(&grad.time_step(t));
            } else if t == steps - 1 {
                dh.add_assign(grad);
            }

            let gates = cache.gates[t].data();
            let c_t = cache.cells[t + 1].data();
            let c_prev = cache.cells[t].data();
            let mut dz = vec![0.0f32; batch * 4 * h];
            for b in 0..batch {
                let g_row = &gates[b * 4 * h..(b + 1) * 4 * h];
                let dz_row = &mut dz[b * 4 * h..(b + 1) * 4 * h];
                for j in 0..h {
                    let k = b * h + j;
                    let (i_g, f_g, g_g, o_g) = (g_row[j], g_row[h + j], g_row[2 * h + j], g_row[3 * h + j]);
                    let tc = c_t[k].tanh();
                    let dh_k = dh.data()[k];
                    let d_o = dh_k * tc;
                    let dc = dc_next[k] + dh_k * o_g * (1.0 - tc * tc);
                    dz_row[j] = dc * g_g * i_g * (1.0 - i_g);
                    dz_row[h + j] = dc * c_prev[k] * f_g * (1.0 - f_g);
                    dz_row[2 * h + j] = dc * i_g * (1.0 - g_g * g_g);
                    dz_row[3 * h + j] = d_o * o_g * (1.0 - o_g);
                    dc_next[k] = dc * f_g;
                }
            }
            let dz = Tensor::from_data(&[batch, 4 * h], dz);

            kernel_grad.add_assign(&cache.inputs[t].transpose().matmul(&dz));
            recurrent_grad.add_assign(&cache.hiddens[t].transpose().matmul(&dz));
            bias_grad.add_assign(&dz.sum_axis(0));
            dx_steps[t] = dz.matmul(&kernel_t);
            dh_next = dz.matmul(&recurrent_t);
        }

        self.kernel_grad.add_assign(&kernel_grad);
        self.recurrent_kernel_grad.add_assign(&recurrent_grad);
        self.bias_grad.add_assign(&bias_grad);
        Ok(Tensor::stack_time(&dx_steps))
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.kernel, &self.recurrent_kernel, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.kernel, &mut self.recurrent_kernel, &mut self.bias]
    }

    fn gradients(&self) -> Vec<&Tensor> {
        vec![
            &self.kernel_grad,
            &self.recurrent_kernel_grad,
            &self.bias_grad,
        ]
    }

    fn zero_grad(&mut self) {
        self.kernel_grad.fill_zero();
        self.recurrent_kernel_grad.fill_zero();
        self.bias_grad.fill_zero();
    }

    fn parameter_names(&self) -> Vec<String> {
        vec![
            "kernel".to_string(),
            "recurrent_kernel".to_string(),
            "bias".to_string(),
        ]
    }

    fn name(&self) -> &str {
        "LSTM"
    }
}
