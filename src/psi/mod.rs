pub mod eit;
pub mod nit;
pub mod pat;
pub mod pmt;
pub mod sdt;
pub mod section;
pub mod tot;

pub use eit::{EitEvent, EitSection};
pub use nit::{NitSection, NitTransport};
pub use pat::{PatEntry, PatSection};
pub use pmt::{EsStream, PmtSection};
pub use sdt::{SdtSection, SdtService};
pub use section::{parse_psi, PsiData, PsiSection, PsiSectionHeader, PsiSyntaxHeader, TableBody, TableType};
pub use tot::TotSection;
