//! eq-model: the structural Domain the equilibrium engine works on.
//!
//! Provides:
//! - Nodes with trial/committed displacement, velocity and acceleration
//! - The `Element` trait plus reference linear and softening springs
//! - Homogeneous single-point constraints and nodal load patterns
//! - A change stamp that advances whenever topology, constraints or loads change
//! - An explicit, owned element registry for front ends
//!
//! # Example
//!
//! ```
//! use eq_model::{Domain, LinearSpring, LoadPattern, NodalLoad, TimeSeries};
//!
//! let mut domain = Domain::new();
//! let n1 = domain.add_node(1);
//! let n2 = domain.add_node(1);
//! domain.fix(n1, 0).unwrap();
//! domain
//!     .add_element(Box::new(LinearSpring::new((n1, 0), (n2, 0), 100.0)))
//!     .unwrap();
//! domain
//!     .add_load_pattern(LoadPattern::new(
//!         TimeSeries::Linear { factor: 1.0 },
//!         vec![NodalLoad { node: n2, dof: 0, value: 1.0 }],
//!     ))
//!     .unwrap();
//!
//! assert_eq!(domain.nodes().count(), 2);
//! assert_eq!(domain.elements().count(), 1);
//! ```

pub mod domain;
pub mod element;
pub mod error;
pub mod load;
pub mod node;
pub mod registry;
pub mod springs;

pub use domain::{Domain, SpConstraint};
pub use element::{DofRef, Element};
pub use error::{ModelError, ModelResult};
pub use load::{LoadPattern, NodalLoad, TimeSeries};
pub use node::Node;
pub use registry::{ElementArgs, ElementFactory, ElementRegistry};
pub use springs::{LinearSpring, SofteningSpring};
