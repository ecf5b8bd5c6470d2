//! Vendor read model. An external registry owns these rows; the engine only
//! reads them for eligibility checks at contract creation.

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Vendor {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub is_active: bool,
    #[n(3)]
    pub performance_rating: f64,
}
