pub mod eligibility;
pub mod extract;
