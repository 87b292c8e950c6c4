//! Decorrelate jet energy corrections between jet categories
//!
//! The JEC and JER variations of the regressed jet transverse momenta
//! are split into four categories by jet `pt` and pseudorapidity. For
//! each variation and category only the jets inside the category are
//! varied. The Higgs candidate is rebuilt from its two jets, and its
//! stored kinematics are scaled by the ratio of varied to nominal
//! values.
//!
//! All derived columns are declared up front in [derived_columns]:
//! `HCSV_reg_corr<syst><var>_<obs>_<category>` per event and
//! `Jet_pt_reg_corr<syst><var>_<category>` per jet.
use std::{collections::HashMap, path::Path, sync::Arc};

use arrow::{
    array::{ArrayRef, Float32Builder, Float64Array, ListBuilder},
    datatypes::{DataType, Field, FieldRef, Schema, SchemaRef},
    error::ArrowError,
    record_batch::RecordBatch,
};
use itertools::iproduct;
use log::{debug, info, warn};
use strum::{Display, EnumIter, IntoEnumIterator};
use thiserror::Error;
use typed_builder::TypedBuilder;

use crate::{
    compression::Compression,
    four_vector::FourVector,
    table::{ListColumn, ScoreColumn, TableError, TableReader, TableWriter},
};

/// Regressed jet transverse momenta
pub const JET_PT: &str = "Jet_pt_reg";
/// Jet pseudorapidities
pub const JET_ETA: &str = "Jet_eta";
/// Jet azimuthal angles
pub const JET_PHI: &str = "Jet_phi";
/// Jet masses
pub const JET_MASS: &str = "Jet_mass";
/// Indices of the two jets forming the Higgs candidate
pub const HIGGS_JETS: &str = "hJCidx";
/// Prefix of the Higgs candidate kinematics
pub const HIGGS: &str = "HCSV_reg";

/// Jets above this `pt` are in a high-`pt` category
pub const PT_THRESHOLD: f64 = 100.;
/// Jets below this `|eta|` are in a central category
pub const CENTRAL_ETA: f64 = 1.4;

/// Source of a jet energy variation
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Systematic {
    /// Jet energy correction
    JEC,
    /// Jet energy resolution
    JER,
}

/// Direction of a variation
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Variation {
    Up,
    Down,
}

/// Jet category by transverse momentum and pseudorapidity
///
/// Jets exactly at [PT_THRESHOLD] or [CENTRAL_ETA] belong to no
/// category.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Category {
    HighCentral,
    LowCentral,
    HighForward,
    LowForward,
}

impl Category {
    /// Whether a jet with the given `pt` and `eta` is in this category
    pub fn contains(self, pt: f64, eta: f64) -> bool {
        let eta = eta.abs();
        let (high, low) = (pt > PT_THRESHOLD, pt < PT_THRESHOLD);
        let (central, forward) = (eta < CENTRAL_ETA, eta > CENTRAL_ETA);
        match self {
            Self::HighCentral => high && central,
            Self::LowCentral => low && central,
            Self::HighForward => high && forward,
            Self::LowForward => low && forward,
        }
    }
}

/// Stored kinematic quantity of the Higgs candidate
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum HiggsObservable {
    Mass,
    Pt,
    Eta,
    Phi,
}

impl HiggsObservable {
    /// Input column with the nominal value
    pub fn column(self) -> String {
        format!("{HIGGS}_{self}")
    }

    fn of(self, p: &FourVector) -> f64 {
        match self {
            Self::Mass => p.m(),
            Self::Pt => p.pt(),
            Self::Eta => p.eta(),
            Self::Phi => p.phi(),
        }
    }
}

/// A systematic variation restricted to one jet category
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Variant {
    pub systematic: Systematic,
    pub variation: Variation,
    /// Only jets in this category are varied
    pub category: Category,
}

impl Variant {
    /// All variants, in output order
    pub fn all() -> impl Iterator<Item = Variant> + Clone {
        iproduct!(Systematic::iter(), Variation::iter(), Category::iter()).map(
            |(systematic, variation, category)| Variant {
                systematic,
                variation,
                category,
            },
        )
    }

    /// Input column with the varied jet `pt` for all jets
    pub fn source_column(&self) -> String {
        source_column(self.systematic, self.variation)
    }
}

fn source_column(systematic: Systematic, variation: Variation) -> String {
    format!("{JET_PT}_corr{systematic}{variation}")
}

/// A column added by the decorrelation
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DerivedColumn {
    /// Higgs candidate quantity, one `f32` per event
    Higgs(HiggsObservable, Variant),
    /// Jet `pt`, a list of `f32` with one entry per jet
    JetPt(Variant),
}

impl DerivedColumn {
    /// Column name
    pub fn name(&self) -> String {
        match self {
            Self::Higgs(obs, v) => format!(
                "{HIGGS}_corr{}{}_{obs}_{}",
                v.systematic, v.variation, v.category
            ),
            Self::JetPt(v) => format!("{}_{}", v.source_column(), v.category),
        }
    }

    /// Column type
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Higgs(..) => DataType::Float32,
            Self::JetPt(..) => DataType::List(jet_pt_item()),
        }
    }

    fn field(&self) -> FieldRef {
        Arc::new(Field::new(self.name(), self.data_type(), false))
    }
}

fn jet_pt_item() -> FieldRef {
    Arc::new(Field::new_list_field(DataType::Float32, false))
}

/// All derived columns, in output order
///
/// First the Higgs candidate mass, `pt`, `eta`, and `phi` for every
/// [Variant], then the jet `pt` lists for every [Variant].
pub fn derived_columns() -> Vec<DerivedColumn> {
    let higgs = iproduct!(HiggsObservable::iter(), Variant::all())
        .map(|(obs, v)| DerivedColumn::Higgs(obs, v));
    let jets = Variant::all().map(DerivedColumn::JetPt);
    higgs.chain(jets).collect()
}

/// Copies an event table, adding category-decorrelated JEC/JER columns
#[derive(Clone, Debug, TypedBuilder)]
pub struct Decorrelator {
    /// Log progress after this many events
    #[builder(default = 10000)]
    progress_interval: u64,
    /// Output compression
    #[builder(default)]
    compression: Option<Compression>,
}

impl Decorrelator {
    /// Write a copy of `src` with the derived columns to `dst`
    ///
    /// Existing columns with the name of a derived column are replaced.
    /// Returns the number of events.
    pub fn run(&self, src: &Path, dst: &Path) -> Result<u64, DecorrelateError> {
        info!("Reading events from {src:?}");
        let reader = TableReader::open(src)?;
        let in_schema = reader.schema();

        let derived = derived_columns();
        let derived_names: Vec<_> = derived.iter().map(|c| c.name()).collect();
        let keep: Vec<usize> = in_schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, field)| {
                let replaced = derived_names.contains(field.name());
                if replaced {
                    warn!("Replacing existing column {}", field.name());
                }
                !replaced
            })
            .map(|(idx, _)| idx)
            .collect();
        let mut fields: Vec<FieldRef> =
            keep.iter().map(|&idx| in_schema.fields()[idx].clone()).collect();
        fields.extend(derived.iter().map(|c| c.field()));
        let out_schema: SchemaRef = Arc::new(
            Schema::new(fields).with_metadata(in_schema.metadata().clone()),
        );
        debug!("Adding {} columns", derived.len());

        info!("Writing events to {dst:?}");
        let mut writer =
            TableWriter::create(dst, out_schema.clone(), self.compression)?;
        let mut rows = 0;
        for batch in reader {
            let batch = batch?;
            let events = Events::from_batch(&batch)?;
            let mut columns: Vec<ArrayRef> =
                keep.iter().map(|&idx| batch.column(idx).clone()).collect();
            columns.extend(self.decorrelate(&events, &mut rows)?);
            let batch = RecordBatch::try_new(out_schema.clone(), columns)
                .map_err(DecorrelateError::Batch)?;
            writer.write(&batch)?;
        }
        writer.close()?;
        info!("Decorrelated {rows} events");
        Ok(rows)
    }

    fn decorrelate(
        &self,
        events: &Events,
        rows: &mut u64,
    ) -> Result<Vec<ArrayRef>, DecorrelateError> {
        let variants: Vec<_> = Variant::all().collect();
        let observables: Vec<_> = HiggsObservable::iter().collect();
        let n_events = events.pt.len();
        let mut higgs: Vec<_> = (0..observables.len() * variants.len())
            .map(|_| Float32Builder::with_capacity(n_events))
            .collect();
        let mut jets: Vec<_> = variants
            .iter()
            .map(|_| ListBuilder::new(Float32Builder::new()).with_field(jet_pt_item()))
            .collect();

        for row in 0..n_events {
            *rows += 1;
            if self.progress_interval > 0 && *rows % self.progress_interval == 0 {
                info!("Processing event #{rows}");
            }
            let event = events.event(row)?;
            let nominal = event.higgs(|jet| event.pt[jet]);
            for (v_idx, v) in variants.iter().enumerate() {
                let varied = &events.varied[&(v.systematic, v.variation)];
                let varied = varied.row(row);
                let jet_pt = |jet: usize| {
                    if v.category.contains(event.pt[jet], event.eta[jet]) {
                        varied[jet]
                    } else {
                        event.pt[jet]
                    }
                };
                let higgs_varied = event.higgs(jet_pt);
                for (o_idx, obs) in observables.iter().enumerate() {
                    let ratio = obs.of(&higgs_varied) / obs.of(&nominal);
                    let value = events.higgs[o_idx].value(row) * ratio;
                    higgs[o_idx * variants.len() + v_idx].append_value(value as f32);
                }
                let builder = &mut jets[v_idx];
                for jet in 0..event.pt.len() {
                    builder.values().append_value(jet_pt(jet) as f32);
                }
                builder.append(true);
            }
        }

        let higgs = higgs
            .iter_mut()
            .map(|b| Arc::new(b.finish()) as ArrayRef);
        let jets = jets.iter_mut().map(|b| Arc::new(b.finish()) as ArrayRef);
        Ok(higgs.chain(jets).collect())
    }
}

/// Input columns of one record batch
struct Events {
    pt: ListColumn,
    eta: ListColumn,
    phi: ListColumn,
    mass: ListColumn,
    higgs_jets: ListColumn,
    varied: HashMap<(Systematic, Variation), ListColumn>,
    /// Nominal Higgs candidate quantities, in [HiggsObservable] order
    higgs: Vec<Float64Array>,
}

impl Events {
    fn from_batch(batch: &RecordBatch) -> Result<Self, DecorrelateError> {
        let mut varied = HashMap::new();
        for (syst, var) in iproduct!(Systematic::iter(), Variation::iter()) {
            let col = ListColumn::from_batch(batch, &source_column(syst, var))?;
            varied.insert((syst, var), col);
        }
        let higgs = HiggsObservable::iter()
            .map(|obs| ScoreColumn::Scalar(obs.column()).extract(batch))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            pt: ListColumn::from_batch(batch, JET_PT)?,
            eta: ListColumn::from_batch(batch, JET_ETA)?,
            phi: ListColumn::from_batch(batch, JET_PHI)?,
            mass: ListColumn::from_batch(batch, JET_MASS)?,
            higgs_jets: ListColumn::from_batch(batch, HIGGS_JETS)?,
            varied,
            higgs,
        })
    }

    fn event(&self, row: usize) -> Result<Event<'_>, DecorrelateError> {
        let pt = self.pt.row(row);
        let n_jets = pt.len();
        let jet_columns = [
            (JET_ETA.to_owned(), &self.eta),
            (JET_PHI.to_owned(), &self.phi),
            (JET_MASS.to_owned(), &self.mass),
        ]
        .into_iter()
        .chain(
            self.varied
                .iter()
                .map(|(&(syst, var), col)| (source_column(syst, var), col)),
        );
        for (column, col) in jet_columns {
            let found = col.row(row).len();
            if found != n_jets {
                return Err(DecorrelateError::JetCount {
                    column,
                    row,
                    expected: n_jets,
                    found,
                });
            }
        }

        let higgs_jets = self.higgs_jets.row(row);
        let [first, second, ..] = higgs_jets else {
            return Err(DecorrelateError::MissingHiggsJets {
                row,
                found: higgs_jets.len(),
            });
        };
        let jet_index = |index: f64| {
            if index >= 0. && index.fract() == 0. && (index as usize) < n_jets {
                Ok(index as usize)
            } else {
                Err(DecorrelateError::HiggsJetIndex {
                    row,
                    index,
                    jets: n_jets,
                })
            }
        };
        Ok(Event {
            pt,
            eta: self.eta.row(row),
            phi: self.phi.row(row),
            mass: self.mass.row(row),
            higgs_jets: [jet_index(*first)?, jet_index(*second)?],
        })
    }
}

/// Jets of a single event
struct Event<'a> {
    pt: &'a [f64],
    eta: &'a [f64],
    phi: &'a [f64],
    mass: &'a [f64],
    higgs_jets: [usize; 2],
}

impl Event<'_> {
    /// Higgs candidate with the given jet `pt`
    fn higgs(&self, pt: impl Fn(usize) -> f64) -> FourVector {
        let [first, second] = self.higgs_jets.map(|jet| {
            FourVector::from_pt_eta_phi_m(
                pt(jet),
                self.eta[jet],
                self.phi[jet],
                self.mass[jet],
            )
        });
        first + second
    }
}

/// Error decorrelating jet energy variations
#[derive(Debug, Error)]
pub enum DecorrelateError {
    /// Failed to read or write a table
    #[error(transparent)]
    Table(#[from] TableError),
    /// Jet columns with different numbers of jets
    #[error("Column '{column}' has {found} entries in row {row}, expected {expected} jets")]
    JetCount {
        /// Offending column
        column: String,
        /// Row
        row: usize,
        /// Number of jets in `Jet_pt_reg`
        expected: usize,
        /// Number of entries found
        found: usize,
    },
    /// Fewer than two Higgs candidate jets
    #[error("Need two Higgs candidate jets in row {row}, found {found}")]
    MissingHiggsJets {
        /// Row
        row: usize,
        /// Number of entries in `hJCidx`
        found: usize,
    },
    /// Invalid Higgs candidate jet index
    #[error("Invalid Higgs candidate jet index {index} in row {row} with {jets} jets")]
    HiggsJetIndex {
        /// Row
        row: usize,
        /// Index
        index: f64,
        /// Number of jets
        jets: usize,
    },
    /// Failed to assemble the output rows
    #[error("Failed to assemble output record batch")]
    Batch(#[source] ArrowError),
}
