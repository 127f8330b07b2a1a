//! The tagged lazy view and its single coordinate resolver.
//!
//! A [`VirtualArray`] is one of a small, closed set of variants. Composition
//! wraps an existing view in a new variant; evaluation walks the variants
//! from the outside in, rewriting the coordinate at each level until a
//! [`Source`] answers. Views hold their children behind [`Arc`], so cloning
//! and sharing a deeply nested view across threads is cheap.

use std::fmt;
use std::sync::Arc;

use blockwise_traits::Numeric;
use smallvec::SmallVec;

use crate::array::DenseArray;
use crate::extend::Extension;
use crate::interval::Interval;
use crate::{Result, ViewError};

/// Coordinates rewritten during resolution stay on the stack up to rank 4.
type Coords = SmallVec<[i64; 4]>;

/// A bounded, addressable producer of values.
///
/// Implementors must accept every position inside [`Source::bounds`];
/// reads outside are a contract violation and should return
/// [`ViewError::OutOfBounds`].
pub trait Source<T>: Send + Sync {
    fn bounds(&self) -> &Interval;

    fn read(&self, position: &[i64]) -> Result<T>;
}

impl<T: Numeric> Source<T> for DenseArray<T> {
    fn bounds(&self) -> &Interval {
        self.interval()
    }

    fn read(&self, position: &[i64]) -> Result<T> {
        self.get(position)
    }
}

/// Elementwise operator of a [`VirtualArray::Combined`] view.
///
/// Each operator receives both operands by reference and writes into a
/// fresh destination element.
pub enum BinaryOp<T> {
    /// `dest = a + b`
    Add,
    /// `dest = a - b`
    Sub,
    /// `dest = a * b`
    Mul,
    /// `dest = a / b`
    Div,
    /// `dest = (b - a) * 0.5`
    HalfDifference,
    /// Arbitrary `(a, b, dest)` operator.
    Custom(Arc<dyn Fn(&T, &T, &mut T) + Send + Sync>),
}

impl<T> Clone for BinaryOp<T> {
    fn clone(&self) -> Self {
        match self {
            BinaryOp::Add => BinaryOp::Add,
            BinaryOp::Sub => BinaryOp::Sub,
            BinaryOp::Mul => BinaryOp::Mul,
            BinaryOp::Div => BinaryOp::Div,
            BinaryOp::HalfDifference => BinaryOp::HalfDifference,
            BinaryOp::Custom(f) => BinaryOp::Custom(Arc::clone(f)),
        }
    }
}

impl<T> fmt::Debug for BinaryOp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinaryOp::Add => "Add",
            BinaryOp::Sub => "Sub",
            BinaryOp::Mul => "Mul",
            BinaryOp::Div => "Div",
            BinaryOp::HalfDifference => "HalfDifference",
            BinaryOp::Custom(_) => "Custom",
        };
        f.write_str(name)
    }
}

impl<T: Numeric> BinaryOp<T> {
    #[inline]
    pub fn apply(&self, a: &T, b: &T, dest: &mut T) {
        match self {
            BinaryOp::Add => {
                dest.set(a);
                dest.add(b);
            }
            BinaryOp::Sub => {
                dest.set(a);
                dest.sub(b);
            }
            BinaryOp::Mul => {
                dest.set(a);
                dest.mul(b);
            }
            BinaryOp::Div => {
                dest.set(a);
                dest.div(b);
            }
            BinaryOp::HalfDifference => {
                dest.set(b);
                dest.sub(a);
                dest.scale(0.5);
            }
            BinaryOp::Custom(f) => f(a, b, dest),
        }
    }
}

/// A lazily evaluated N-dimensional array.
pub enum VirtualArray<T> {
    /// Leaf backed by a bounded [`Source`].
    Source(Arc<dyn Source<T>>),
    /// Reading `p` reads `p - offset` on the source.
    Translated {
        source: Arc<VirtualArray<T>>,
        offset: Vec<i64>,
    },
    /// Defined everywhere: reads outside `bounds` follow `policy`.
    Extended {
        source: Arc<VirtualArray<T>>,
        policy: Extension,
        bounds: Interval,
    },
    /// Elementwise combination of two views of equal rank.
    Combined {
        a: Arc<VirtualArray<T>>,
        b: Arc<VirtualArray<T>>,
        op: BinaryOp<T>,
        create: fn() -> T,
    },
    /// Restriction to `interval`; reads outside are a contract violation.
    Cropped {
        source: Arc<VirtualArray<T>>,
        interval: Interval,
    },
}

impl<T> Clone for VirtualArray<T> {
    fn clone(&self) -> Self {
        match self {
            VirtualArray::Source(s) => VirtualArray::Source(Arc::clone(s)),
            VirtualArray::Translated { source, offset } => VirtualArray::Translated {
                source: Arc::clone(source),
                offset: offset.clone(),
            },
            VirtualArray::Extended {
                source,
                policy,
                bounds,
            } => VirtualArray::Extended {
                source: Arc::clone(source),
                policy: *policy,
                bounds: bounds.clone(),
            },
            VirtualArray::Combined { a, b, op, create } => VirtualArray::Combined {
                a: Arc::clone(a),
                b: Arc::clone(b),
                op: op.clone(),
                create: *create,
            },
            VirtualArray::Cropped { source, interval } => VirtualArray::Cropped {
                source: Arc::clone(source),
                interval: interval.clone(),
            },
        }
    }
}

impl<T> fmt::Debug for VirtualArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VirtualArray::Source(s) => f.debug_tuple("Source").field(s.bounds()).finish(),
            VirtualArray::Translated { source, offset } => f
                .debug_struct("Translated")
                .field("offset", offset)
                .field("source", source)
                .finish(),
            VirtualArray::Extended {
                source,
                policy,
                bounds,
            } => f
                .debug_struct("Extended")
                .field("policy", policy)
                .field("bounds", bounds)
                .field("source", source)
                .finish(),
            VirtualArray::Combined { a, b, op, .. } => f
                .debug_struct("Combined")
                .field("op", op)
                .field("a", a)
                .field("b", b)
                .finish(),
            VirtualArray::Cropped { source, interval } => f
                .debug_struct("Cropped")
                .field("interval", interval)
                .field("source", source)
                .finish(),
        }
    }
}

impl<T> VirtualArray<T> {
    /// Wrap a source as a leaf view.
    pub fn from_source<S: Source<T> + 'static>(source: S) -> Self {
        VirtualArray::Source(Arc::new(source))
    }

    /// Wrap an already shared source.
    pub fn from_shared(source: Arc<dyn Source<T>>) -> Self {
        VirtualArray::Source(source)
    }

    pub fn ndim(&self) -> usize {
        match self {
            VirtualArray::Source(s) => s.bounds().ndim(),
            VirtualArray::Translated { offset, .. } => offset.len(),
            VirtualArray::Extended { bounds, .. } => bounds.ndim(),
            VirtualArray::Combined { a, .. } => a.ndim(),
            VirtualArray::Cropped { interval, .. } => interval.ndim(),
        }
    }

    /// Finite bounds of the view, or `None` if it is defined everywhere.
    pub fn bounds(&self) -> Option<Interval> {
        match self {
            VirtualArray::Source(s) => Some(s.bounds().clone()),
            VirtualArray::Translated { source, offset } => source
                .bounds()
                .and_then(|b| b.translate(offset).ok()),
            VirtualArray::Extended { .. } => None,
            VirtualArray::Combined { a, b, .. } => match (a.bounds(), b.bounds()) {
                (Some(x), Some(y)) => x.intersect(&y),
                (Some(x), None) | (None, Some(x)) => Some(x),
                (None, None) => None,
            },
            VirtualArray::Cropped { interval, .. } => Some(interval.clone()),
        }
    }

    fn check_rank(&self, rank: usize) -> Result<()> {
        if rank != self.ndim() {
            return Err(ViewError::RankMismatch(self.ndim(), rank));
        }
        Ok(())
    }

    /// Shift the origin by `+offset`: reading `p` reads `p - offset`.
    pub fn translate(&self, offset: &[i64]) -> Result<Self> {
        self.check_rank(offset.len())?;
        Ok(VirtualArray::Translated {
            source: Arc::new(self.clone()),
            offset: offset.to_vec(),
        })
    }

    /// Shift the origin by `-offset`: reading `p` reads `p + offset`.
    pub fn translate_inverse(&self, offset: &[i64]) -> Result<Self> {
        let negated: Vec<i64> = offset.iter().map(|&o| -o).collect();
        self.translate(&negated)
    }

    /// Define the view over the entire coordinate space.
    pub fn extend(&self, policy: Extension) -> Result<Self> {
        let bounds = self.bounds().ok_or(ViewError::Unbounded)?;
        Ok(VirtualArray::Extended {
            source: Arc::new(self.clone()),
            policy,
            bounds,
        })
    }

    /// Restrict the view to `interval`.
    pub fn restrict_to_interval(&self, interval: &Interval) -> Result<Self> {
        self.check_rank(interval.ndim())?;
        Ok(VirtualArray::Cropped {
            source: Arc::new(self.clone()),
            interval: interval.clone(),
        })
    }

    /// Restrict to the block `[offset, offset + shape)`.
    pub fn crop(&self, offset: &[i64], shape: &[i64]) -> Result<Self> {
        self.restrict_to_interval(&Interval::from_offset_shape(offset, shape)?)
    }

    /// Elementwise combination with a custom destination factory.
    pub fn combine_with(&self, other: &Self, op: BinaryOp<T>, create: fn() -> T) -> Result<Self> {
        self.check_rank(other.ndim())?;
        Ok(VirtualArray::Combined {
            a: Arc::new(self.clone()),
            b: Arc::new(other.clone()),
            op,
            create,
        })
    }
}

impl<T: Numeric> VirtualArray<T> {
    /// Elementwise combination; destinations start from `T::create_variable`.
    pub fn combine(&self, other: &Self, op: BinaryOp<T>) -> Result<Self> {
        self.combine_with(other, op, T::create_variable)
    }

    /// Evaluate the view at `position`.
    pub fn get(&self, position: &[i64]) -> Result<T> {
        self.check_rank(position.len())?;
        self.resolve(position)
    }

    fn resolve(&self, position: &[i64]) -> Result<T> {
        match self {
            VirtualArray::Source(s) => s.read(position),
            VirtualArray::Translated { source, offset } => {
                let shifted: Coords = position.iter().zip(offset).map(|(&p, &o)| p - o).collect();
                source.resolve(&shifted)
            }
            VirtualArray::Extended {
                source,
                policy,
                bounds,
            } => {
                if bounds.contains(position) {
                    return source.resolve(position);
                }
                let mut mapped = Coords::with_capacity(position.len());
                for (d, &p) in position.iter().enumerate() {
                    match policy.map_coordinate(p, bounds.min_at(d), bounds.max_at(d)) {
                        Some(x) => mapped.push(x),
                        None => return Ok(T::zero()),
                    }
                }
                source.resolve(&mapped)
            }
            VirtualArray::Combined { a, b, op, create } => {
                let va = a.resolve(position)?;
                let vb = b.resolve(position)?;
                let mut dest = create();
                op.apply(&va, &vb, &mut dest);
                Ok(dest)
            }
            VirtualArray::Cropped { source, interval } => {
                if !interval.contains(position) {
                    return Err(ViewError::OutOfBounds {
                        position: position.to_vec(),
                        interval: interval.clone(),
                    });
                }
                source.resolve(position)
            }
        }
    }

    /// Evaluate every position of `interval` into an owned array.
    pub fn materialize(&self, interval: &Interval) -> Result<DenseArray<T>> {
        self.check_rank(interval.ndim())?;
        let data = interval
            .positions()
            .map(|p| self.resolve(&p))
            .collect::<Result<Vec<T>>>()?;
        DenseArray::from_vec(interval.clone(), data)
    }
}
