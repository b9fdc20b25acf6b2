//! External PDF and coupling providers and the per-convolution node caches.

use crate::axis::Axis;
use crate::igrid::InterpGrid;
use crate::interpolation::reweight_x;
use crate::lumi::FLAVOURS;
use crate::transform::{fq2, Transform};
use ndarray::{s, Array3};
use std::f64::consts::PI;

/// Callback filling the 14 flavour slots with `x·f(pdg; x, Q)`. Slots the
/// PDF set does not provide must be written as zero.
pub type PdfCallback<'a> = &'a mut dyn FnMut(f64, f64, &mut [f64; FLAVOURS]);

/// Callback returning the strong coupling `αₛ(Q)`.
pub type AlphasCallback<'a> = &'a mut dyn FnMut(f64) -> f64;

/// The external providers of one convolution: two PDFs, the strong
/// coupling, and optionally the DGLAP splitting-function convolutions used
/// for factorisation-scale variation.
pub struct ConvolutionCache<'a> {
    pub(crate) pdf1: PdfCallback<'a>,
    pub(crate) pdf2: PdfCallback<'a>,
    pub(crate) alphas: AlphasCallback<'a>,
    pub(crate) splitting: Option<PdfCallback<'a>>,
}

impl<'a> ConvolutionCache<'a> {
    /// Constructor.
    pub fn new(pdf1: PdfCallback<'a>, pdf2: PdfCallback<'a>, alphas: AlphasCallback<'a>) -> Self {
        Self {
            pdf1,
            pdf2,
            alphas,
            splitting: None,
        }
    }

    /// Attaches a splitting-function provider with the same flavour layout
    /// as the PDF callbacks.
    #[must_use]
    pub fn with_splitting(mut self, splitting: PdfCallback<'a>) -> Self {
        self.splitting = Some(splitting);
        self
    }
}

/// Precomputed provider values at every interpolation node of one
/// [`InterpGrid`]. Built at the start of a convolution and dropped at its
/// end.
pub(crate) struct NodeCache {
    alphas: Vec<f64>,
    fg1: Array3<f64>,
    fg2: Option<Array3<f64>>,
    fsplit1: Option<Array3<f64>>,
    fsplit2: Option<Array3<f64>>,
}

impl NodeCache {
    pub(crate) fn new<'a>(
        igrid: &InterpGrid,
        providers: &mut ConvolutionCache<'a>,
        xi_r: f64,
        xi_f: f64,
        beam_scale: f64,
        nloop: u32,
    ) -> Self {
        let taxis = igrid.taxis();
        let scales: Vec<f64> = taxis.node_values().iter().map(|&tau| fq2(tau).sqrt()).collect();

        let alphas = scales
            .iter()
            .map(|&q| (providers.alphas)(xi_r * q) * 0.5 / PI)
            .collect();

        // factorisation-scale variation needs the splitting tables exactly
        // for one-loop grids away from the central scale
        let build_splitting = nloop == 1 && xi_f != 1.0 && providers.splitting.is_some();

        let (fg1, fsplit1) = tables(
            &scales,
            igrid.y1axis(),
            igrid.transform(),
            igrid.reweight(),
            xi_f,
            beam_scale,
            &mut *providers.pdf1,
            if build_splitting {
                providers.splitting.as_deref_mut()
            } else {
                None
            },
        );

        let (fg2, fsplit2) = if igrid.is_symmetric() {
            (None, None)
        } else {
            let (fg2, fsplit2) = tables(
                &scales,
                igrid.y2axis(),
                igrid.transform(),
                igrid.reweight(),
                xi_f,
                beam_scale,
                &mut *providers.pdf2,
                if build_splitting {
                    providers.splitting.as_deref_mut()
                } else {
                    None
                },
            );
            (Some(fg2), fsplit2)
        };

        Self {
            alphas,
            fg1,
            fg2,
            fsplit1,
            fsplit2,
        }
    }

    /// The strong coupling over `2π` at the `τ` node with index `itau`.
    pub(crate) fn alphas(&self, itau: usize) -> f64 {
        self.alphas[itau]
    }

    pub(crate) fn pdf1(&self, itau: usize, iy: usize) -> &[f64] {
        row(&self.fg1, itau, iy)
    }

    pub(crate) fn pdf2(&self, itau: usize, iy: usize) -> &[f64] {
        row(self.fg2.as_ref().unwrap_or(&self.fg1), itau, iy)
    }

    pub(crate) fn splitting1(&self, itau: usize, iy: usize) -> &[f64] {
        row(
            self.fsplit1
                .as_ref()
                .unwrap_or_else(|| unreachable!("splitting tables were not built")),
            itau,
            iy,
        )
    }

    pub(crate) fn splitting2(&self, itau: usize, iy: usize) -> &[f64] {
        row(
            self.fsplit2
                .as_ref()
                .or(self.fsplit1.as_ref())
                .unwrap_or_else(|| unreachable!("splitting tables were not built")),
            itau,
            iy,
        )
    }

    pub(crate) fn has_splitting(&self) -> bool {
        self.fsplit1.is_some()
    }
}

fn row(table: &Array3<f64>, itau: usize, iy: usize) -> &[f64] {
    table
        .slice(s![itau, iy, ..])
        .to_slice()
        // UNWRAP: the tables are standard layout, so rows are contiguous
        .unwrap_or_else(|| unreachable!())
}

#[allow(clippy::too_many_arguments)]
fn tables<'a>(
    scales: &[f64],
    yaxis: &Axis,
    transform: &Transform,
    reweight: bool,
    xi_f: f64,
    beam_scale: f64,
    pdf: &mut dyn FnMut(f64, f64, &mut [f64; FLAVOURS]),
    mut splitting: Option<&mut (dyn FnMut(f64, f64, &mut [f64; FLAVOURS]) + 'a)>,
) -> (Array3<f64>, Option<Array3<f64>>) {
    let ny = yaxis.nodes();
    let mut fg = Array3::zeros((scales.len(), ny, FLAVOURS));
    let mut fsplit = splitting
        .is_some()
        .then(|| Array3::zeros((scales.len(), ny, FLAVOURS)));
    let mut buffer = [0.0; FLAVOURS];

    for (itau, &q) in scales.iter().enumerate() {
        for iy in 0..ny {
            let x = transform.x(yaxis.node(iy));
            let fun = if reweight { reweight_x(x) } else { 1.0 };

            let x = x * beam_scale;
            // beyond the kinematic limit the distributions vanish
            if x >= 1.0 && beam_scale != 1.0 {
                continue;
            }

            pdf(x, xi_f * q, &mut buffer);
            for (slot, &value) in buffer.iter().enumerate() {
                fg[[itau, iy, slot]] = value / x * fun;
            }

            if let (Some(splitting), Some(fsplit)) = (splitting.as_mut(), fsplit.as_mut()) {
                splitting(x, xi_f * q, &mut buffer);
                for (slot, &value) in buffer.iter().enumerate() {
                    fsplit[[itau, iy, slot]] = value / x * fun;
                }
            }
        }
    }

    (fg, fsplit)
}
