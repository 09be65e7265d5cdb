//! Simulation modules
//!
//! The base demographics module plus the disease, risk-factor, and
//! intervention modules built on the kernel's module contract.

pub mod blood_pressure;
pub mod chronic_condition;
pub mod demographics;
pub mod healthcare_access;
pub mod screening;

pub use blood_pressure::BloodPressureModule;
pub use chronic_condition::ChronicConditionModule;
pub use demographics::DemographicsModule;
pub use healthcare_access::HealthcareAccessModule;
pub use screening::OpportunisticScreeningModule;
