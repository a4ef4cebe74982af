pub type Endpoint = str;

pub const LOGIN: &Endpoint = "/orchestration/Authentication/Login";
pub const BASIC_INFO: &Endpoint = "/orchestration/User/GetBasicInfo";
/* sic: the provider spells it "Bussinespartner" */
pub const ACCOUNTS: &Endpoint = "/orchestration/User/GetAccountIdByBussinespartnerId";
pub const METERING_POINTS: &Endpoint = "/orchestration/User/GetMeteringPointByAccountId";
pub const CONSUMPTION_MONTH: &Endpoint = "/orchestration/ConsumptionRecord/Month";
pub const CONSUMPTION_DAY: &Endpoint = "/orchestration/ConsumptionRecord/Day";
