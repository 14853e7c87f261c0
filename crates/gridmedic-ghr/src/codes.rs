//! NHC error-code → GHR impact classification mapping.

/// Resolve an NHC error code to its GHR impact classification.
pub fn classification_for(code: &str) -> Option<&'static str> {
    let classification = match code {
        "NHC2001" => "Resource.Hpc.Unhealthy.HpcGenericFailure",
        "NHC2002" => "Resource.Hpc.Unhealthy.MissingIB",
        "NHC2003" => "Resource.Hpc.Unhealthy.IBPerformance",
        "NHC2004" => "Resource.Hpc.Unhealthy.IBPortDown",
        "NHC2005" => "Resource.Hpc.Unhealthy.IBPortFlapping",
        "NHC2007" => "Resource.Hpc.Unhealthy.HpcRowRemapFailure",
        "NHC2008" => "Resource.Hpc.Unhealthy.HpcInforomCorruption",
        "NHC2009" => "Resource.Hpc.Unhealthy.HpcMissingGpu",
        "NHC2010" => "Resource.Hpc.Unhealthy.ManualInvestigation",
        "NHC2011" => "Resource.Hpc.Unhealthy.XID95UncontainedECCError",
        "NHC2012" => "Resource.Hpc.Unhealthy.XID94ContainedECCError",
        "NHC2013" => "Resource.Hpc.Unhealthy.XID79FallenOffBus",
        "NHC2014" => "Resource.Hpc.Unhealthy.XID48DoubleBitECC",
        "NHC2015" => "Resource.Hpc.Unhealthy.UnhealthyGPUNvidiasmi",
        "NHC2016" => "Resource.Hpc.Unhealthy.NvLink",
        "NHC2017" => "Resource.Hpc.Unhealthy.HpcDcgmiThermalReport",
        "NHC2018" => "Resource.Hpc.Unhealthy.ECCPageRetirementTableFull",
        "NHC2019" => "Resource.Hpc.Unhealthy.DBEOverLimit",
        "NHC2020" => "Resource.Hpc.Unhealthy.HpcGpuDcgmDiagFailure",
        "NHC2021" => "Resource.Hpc.Unhealthy.GPUMemoryBWFailure",
        "NHC2022" => "Resource.Hpc.Unhealthy.CPUPerformance",
        _ => return None,
    };
    Some(classification)
}
